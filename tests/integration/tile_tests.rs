//! Tile decoding and normalisation through the image handle.
//!
//! Every compression scheme the codec supports is exercised with payloads
//! produced by real encoders, together with boundary cropping, bilevel
//! expansion, planar images and sparse tiles.

use tiled_pyramid::{ColourSpace, ImageHandle, MemorySource, PyramidError, Tile};

use super::test_utils::*;

fn handle(data: Vec<u8>) -> ImageHandle<MemorySource> {
    ImageHandle::new(MemorySource::single(data))
}

/// Rows `0..height` of a `src_width`-wide tile, cut to `width` columns.
fn crop_rows(tile: &[u8], src_width: usize, width: usize, height: usize) -> Vec<u8> {
    tile.chunks(src_width)
        .take(height)
        .flat_map(|row| row[..width].iter().copied())
        .collect()
}

fn single_tile(ifd: IfdBuilder) -> Tile {
    let data = TiffBuilder::new().add_ifd(ifd).build();
    handle(data).get_tile(0, 0, 0, 0).unwrap()
}

// =============================================================================
// Addressing and cropping
// =============================================================================

#[test]
fn test_full_resolution_interior_tile() {
    let mut handle = handle(classic_pyramid(ByteOrderType::LittleEndian, false));
    let tile = handle.get_tile(0, 0, 2, 5).unwrap();

    assert_eq!((tile.width, tile.height), (32, 32));
    assert_eq!(tile.data.as_ref(), gradient_tile(32, 32, 5).as_slice());
    assert_eq!(tile.channels, 1);
    assert_eq!(tile.bits_per_channel, 8);
    assert_eq!(tile.colour_space, ColourSpace::Greyscale);
    assert_eq!(tile.source, "memory:0,0");
}

#[test]
fn test_boundary_tiles_are_cropped() {
    let mut handle = handle(classic_pyramid(ByteOrderType::BigEndian, true));

    // 100 x 80 at 32: 4 columns (last 4 wide), 3 rows (last 16 high)
    let right = handle.get_tile(0, 0, 2, 3).unwrap();
    assert_eq!((right.width, right.height), (4, 32));
    assert_eq!(right.data.as_ref(), crop_rows(&gradient_tile(32, 32, 3), 32, 4, 32).as_slice());

    let bottom = handle.get_tile(0, 0, 2, 9).unwrap();
    assert_eq!((bottom.width, bottom.height), (32, 16));
    assert_eq!(bottom.data_length, 32 * 16);

    let corner = handle.get_tile(0, 0, 2, 11).unwrap();
    assert_eq!((corner.width, corner.height), (4, 16));
    assert_eq!(corner.data.as_ref(), crop_rows(&gradient_tile(32, 32, 11), 32, 4, 16).as_slice());
    assert!(corner.capacity >= corner.data_length);
}

#[test]
fn test_smallest_resolution_single_tile() {
    let mut handle = handle(classic_pyramid(ByteOrderType::LittleEndian, false));
    let tile = handle.get_tile(0, 0, 0, 0).unwrap();
    assert_eq!((tile.width, tile.height), (25, 20));
    assert_eq!(tile.data_length, 25 * 20);
}

#[test]
fn test_sub_ifd_level_tile() {
    let mut handle = handle(sub_ifd_pyramid(false));
    let tile = handle.get_tile(0, 0, 0, 0).unwrap();
    assert_eq!((tile.width, tile.height), (25, 20));
    assert!(tile.data.iter().all(|&v| v == 7));

    // Back to the full-resolution directory
    let base = handle.get_tile(0, 0, 2, 0).unwrap();
    assert_eq!((base.width, base.height), (32, 32));
}

#[test]
fn test_out_of_range_requests() {
    let mut handle = handle(classic_pyramid(ByteOrderType::LittleEndian, false));
    assert!(matches!(handle.get_tile(0, 0, 3, 0), Err(PyramidError::Range(_))));
    assert!(matches!(handle.get_tile(0, 0, 2, 12), Err(PyramidError::Range(_))));
    assert!(matches!(handle.get_tile(0, 0, 0, 1), Err(PyramidError::Range(_))));

    // The handle stays usable
    assert!(handle.get_tile(0, 0, 1, 0).is_ok());
}

// =============================================================================
// Compression schemes
// =============================================================================

#[test]
fn test_deflate_with_horizontal_predictor() {
    let original = gradient_tile(32, 32, 0x5A);
    let differenced: Vec<u8> = original
        .chunks(32)
        .flat_map(|row| {
            let mut prev = 0u8;
            row.iter()
                .map(|&v| {
                    let d = v.wrapping_sub(prev);
                    prev = v;
                    d
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let tile = single_tile(
        IfdBuilder::tiled(32, 32, 32, 32)
            .short(COMPRESSION, 8)
            .short(PREDICTOR, 2)
            .with_tiles(vec![deflate(&differenced)]),
    );
    assert_eq!(tile.data.as_ref(), original.as_slice());
}

#[test]
fn test_lzw_tile() {
    let original = gradient_tile(32, 32, 0x11);
    let tile = single_tile(
        IfdBuilder::tiled(32, 32, 32, 32)
            .short(COMPRESSION, 5)
            .with_tiles(vec![lzw(&original)]),
    );
    assert_eq!(tile.data.as_ref(), original.as_slice());
}

#[test]
fn test_packbits_tile() {
    let original = gradient_tile(32, 32, 0x22);
    let tile = single_tile(
        IfdBuilder::tiled(32, 32, 32, 32)
            .short(COMPRESSION, 32773)
            .with_tiles(vec![packbits(&original)]),
    );
    assert_eq!(tile.data.as_ref(), original.as_slice());
}

#[test]
fn test_ycbcr_jpeg_tile_decodes_to_rgb() {
    let tile = single_tile(
        IfdBuilder::tiled(16, 16, 16, 16)
            .tag(BITS_PER_SAMPLE, Value::Short(vec![8, 8, 8]))
            .short(SAMPLES_PER_PIXEL, 3)
            .short(PHOTOMETRIC, 6)
            .short(COMPRESSION, 7)
            .with_tiles(vec![rgb_jpeg(16, 16, [200, 40, 40])]),
    );

    assert_eq!(tile.colour_space, ColourSpace::Srgb);
    assert_eq!(tile.channels, 3);
    assert_eq!(tile.data_length, 16 * 16 * 3);
    let pixel = &tile.data[..3];
    assert!(pixel[0].abs_diff(200) <= 8, "red {}", pixel[0]);
    assert!(pixel[1].abs_diff(40) <= 8, "green {}", pixel[1]);
    assert!(pixel[2].abs_diff(40) <= 8, "blue {}", pixel[2]);
}

#[test]
fn test_sixteen_bit_big_endian_samples_in_host_order() {
    let values: Vec<u16> = (0..16).map(|i| i * 1000 + 7).collect();
    let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();

    let data = TiffBuilder::new()
        .with_byte_order(ByteOrderType::BigEndian)
        .add_ifd(
            IfdBuilder::tiled(4, 4, 4, 4)
                .short(BITS_PER_SAMPLE, 16)
                .with_tiles(vec![payload]),
        )
        .build();
    let tile = handle(data).get_tile(0, 0, 0, 0).unwrap();

    assert_eq!(tile.bits_per_channel, 16);
    let decoded: Vec<u16> = tile
        .data
        .chunks_exact(2)
        .map(|c| u16::from_ne_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(decoded, values);
}

#[test]
fn test_unsupported_compression_is_decode_error() {
    let data = TiffBuilder::new()
        .add_ifd(IfdBuilder::tiled(32, 32, 32, 32).short(COMPRESSION, 34712))
        .build();

    match handle(data).get_tile(0, 0, 0, 0) {
        Err(PyramidError::Decode { name, .. }) => assert_eq!(name, "memory:0,0"),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn test_truncated_interior_tile_is_decode_error() {
    // 64x64 at 32: tile 0 is interior but only 10 bytes are stored
    let data = TiffBuilder::new()
        .add_ifd(IfdBuilder::tiled(64, 64, 32, 32).with_tiles(vec![vec![7u8; 10]; 4]))
        .build();

    match handle(data).get_tile(0, 0, 0, 0) {
        Err(PyramidError::Decode { name, .. }) => assert_eq!(name, "memory:0,0"),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn test_oversized_streams_are_capped_to_tile() {
    let zeros = vec![0u8; 1 << 20];
    for (compression, stream) in [(8u16, deflate(&zeros)), (5, lzw(&zeros))] {
        let tile = single_tile(
            IfdBuilder::tiled(32, 32, 32, 32)
                .short(COMPRESSION, compression)
                .with_tiles(vec![stream]),
        );
        assert_eq!(tile.data_length, 32 * 32, "compression {}", compression);
        assert!(tile.data.iter().all(|&b| b == 0));
    }
}

#[test]
fn test_oversized_jpeg_frame_is_decode_error() {
    let data = TiffBuilder::new()
        .add_ifd(
            IfdBuilder::tiled(16, 16, 16, 16)
                .tag(BITS_PER_SAMPLE, Value::Short(vec![8, 8, 8]))
                .short(SAMPLES_PER_PIXEL, 3)
                .short(PHOTOMETRIC, 2)
                .short(COMPRESSION, 7)
                .with_tiles(vec![rgb_jpeg(64, 64, [10, 20, 30])]),
        )
        .build();

    assert!(matches!(
        handle(data).get_tile(0, 0, 0, 0),
        Err(PyramidError::Decode { .. })
    ));
}

// =============================================================================
// Sample layouts
// =============================================================================

#[test]
fn test_bilevel_tile_unpacked() {
    let tile = single_tile(
        IfdBuilder::tiled(16, 2, 16, 2)
            .short(BITS_PER_SAMPLE, 1)
            .with_tiles(vec![vec![0b1011_0000, 0x00, 0xFF, 0xFF]]),
    );

    assert_eq!(tile.colour_space, ColourSpace::Binary);
    assert_eq!(tile.bits_per_channel, 8);
    assert_eq!(tile.data_length, 32);
    assert_eq!(&tile.data[..8], &[255, 0, 255, 255, 0, 0, 0, 0]);
    assert!(tile.data[8..16].iter().all(|&v| v == 0));
    assert!(tile.data[16..].iter().all(|&v| v == 255));
}

#[test]
fn test_min_is_white_bilevel_inverted() {
    let tile = single_tile(
        IfdBuilder::tiled(8, 1, 8, 1)
            .short(BITS_PER_SAMPLE, 1)
            .short(PHOTOMETRIC, 0)
            .with_tiles(vec![vec![0b1011_0000]]),
    );
    assert_eq!(tile.data.as_ref(), &[0, 255, 0, 0, 255, 255, 255, 255]);
}

#[test]
fn test_planar_separate_first_plane() {
    let planes = vec![vec![1u8; 1024], vec![2u8; 1024], vec![3u8; 1024]];
    let tile = single_tile(
        IfdBuilder::tiled(32, 32, 32, 32)
            .tag(BITS_PER_SAMPLE, Value::Short(vec![8, 8, 8]))
            .short(SAMPLES_PER_PIXEL, 3)
            .short(PHOTOMETRIC, 2)
            .short(PLANAR_CONFIGURATION, 2)
            .with_tiles(planes),
    );

    assert_eq!(tile.channels, 1);
    assert_eq!(tile.colour_space, ColourSpace::Greyscale);
    assert_eq!(tile.data_length, 1024);
    assert!(tile.data.iter().all(|&v| v == 1));
}

#[test]
fn test_palette_served_as_indices() {
    let original = gradient_tile(32, 32, 0);
    let tile = single_tile(
        IfdBuilder::tiled(32, 32, 32, 32)
            .short(PHOTOMETRIC, 3)
            .with_tiles(vec![original.clone()]),
    );

    assert_eq!(tile.colour_space, ColourSpace::Greyscale);
    assert_eq!(tile.channels, 1);
    assert_eq!(tile.data.as_ref(), original.as_slice());
}

#[test]
fn test_sparse_tile_is_zero_filled() {
    let tile = single_tile(IfdBuilder::tiled(32, 32, 32, 32).with_tiles(vec![Vec::new()]));
    assert_eq!(tile.data_length, 1024);
    assert!(tile.data.iter().all(|&v| v == 0));
}
