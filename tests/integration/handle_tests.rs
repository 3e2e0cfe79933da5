//! Image handle lifecycle over file-backed and in-memory sources.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use tiled_pyramid::{
    ContainerSource, FileSource, ImageHandle, MemorySource, PyramidError, SequencePattern,
};

use super::test_utils::*;

fn write(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

// =============================================================================
// File-backed handles
// =============================================================================

#[test]
fn test_file_handle_open_and_tile() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "pyramid.tif", &classic_pyramid(ByteOrderType::LittleEndian, false));

    let mut handle = ImageHandle::new(FileSource::single(&path));
    handle.open(0, 0).unwrap();
    assert_eq!(handle.num_resolutions(), 3);

    let tile = handle.get_tile(0, 0, 2, 1).unwrap();
    assert_eq!(tile.data.as_ref(), gradient_tile(32, 32, 1).as_slice());
    assert_eq!(tile.source, path.display().to_string());
    assert!(tile.timestamp.is_some());
}

#[test]
fn test_missing_file_is_resource_error() {
    let dir = TempDir::new().unwrap();
    let mut handle = ImageHandle::new(FileSource::single(dir.path().join("absent.tif")));

    assert!(matches!(handle.open(0, 0), Err(PyramidError::Resource { .. })));
    assert!(!handle.is_open());
    assert!(handle.catalog().is_none());
}

#[test]
fn test_close_twice_then_reopen() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "pyramid.tif", &classic_pyramid(ByteOrderType::BigEndian, false));

    let mut handle = ImageHandle::new(FileSource::single(&path));
    handle.open(0, 0).unwrap();
    let before = handle.catalog().cloned().unwrap();

    handle.close();
    handle.close();
    assert!(!handle.is_open());
    assert_eq!(handle.dimensions(), before.dimensions());

    handle.open(0, 0).unwrap();
    assert_eq!(handle.catalog(), Some(&before));
    assert!(handle.get_tile(0, 0, 1, 0).is_ok());
}

#[test]
fn test_open_while_open_is_rejected() {
    let mut handle = ImageHandle::new(MemorySource::single(page_stack(2)));
    handle.open(0, 0).unwrap();
    assert!(matches!(handle.open(1, 0), Err(PyramidError::Resource { .. })));
    // The original container stays open
    assert_eq!(handle.position(), Some((0, 0)));
}

// =============================================================================
// Sequences and stacks
// =============================================================================

#[test]
fn test_sequence_pattern_switches_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "scan_0_0.tif", &classic_pyramid(ByteOrderType::LittleEndian, false));
    write(
        dir.path(),
        "scan_1_0.tif",
        &TiffBuilder::new()
            .add_ifd(IfdBuilder::tiled(64, 48, 32, 32).with_tiles(vec![vec![99u8; 1024]; 4]))
            .build(),
    );

    let template = format!("{}/scan_{{x}}_{{y}}.tif", dir.path().display());
    let mut handle = ImageHandle::new(FileSource::new(SequencePattern::new(template)));

    let first = handle.get_tile(0, 0, 2, 0).unwrap();
    assert_eq!(handle.num_resolutions(), 3);
    assert!(first.source.ends_with("scan_0_0.tif"));

    let second = handle.get_tile(1, 0, 0, 0).unwrap();
    assert_eq!(handle.position(), Some((1, 0)));
    assert_eq!(handle.num_resolutions(), 1);
    assert_eq!(handle.dimensions(), vec![(64, 48)]);
    assert!(second.source.ends_with("scan_1_0.tif"));
    assert!(second.data.iter().all(|&v| v == 99));

    // Missing member of the sequence
    assert!(matches!(
        handle.get_tile(2, 0, 0, 0),
        Err(PyramidError::Resource { .. })
    ));
}

#[test]
fn test_stack_layers_selected_by_x() {
    let mut handle = ImageHandle::new(MemorySource::single(page_stack(3)));
    handle.open(0, 0).unwrap();

    assert_eq!(handle.stack().len(), 3);
    assert_eq!(handle.num_resolutions(), 1);

    for layer in 0..3 {
        let tile = handle.get_tile(layer, 0, 0, 3).unwrap();
        let expected = 10 * (layer as u8 + 1);
        assert!(tile.data.iter().all(|&v| v == expected), "layer {layer}");
        assert_eq!(tile.x, layer);
    }

    // Layers live in the container that is already open
    assert_eq!(handle.position(), Some((0, 0)));
    assert!(matches!(handle.get_tile(3, 0, 0, 0), Err(PyramidError::Range(_))));
}

#[test]
fn test_memory_source_positions() {
    let source = MemorySource::new()
        .with_container(0, 0, classic_pyramid(ByteOrderType::LittleEndian, false))
        .with_container(0, 1, sub_ifd_pyramid(true));
    assert_eq!(source.name(0, 1), "memory:0,1");

    let mut handle = ImageHandle::new(source);
    handle.get_tile(0, 0, 0, 0).unwrap();
    let tile = handle.get_tile(0, 1, 0, 0).unwrap();

    assert_eq!(tile.source, "memory:0,1");
    assert!(tile.data.iter().all(|&v| v == 7));
    assert!(matches!(
        handle.get_tile(5, 5, 0, 0),
        Err(PyramidError::Resource { .. })
    ));
}
