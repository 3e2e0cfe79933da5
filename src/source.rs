//! Container sources.
//!
//! An image handle addresses its containers by sequence position `(x, y)`.
//! A [`ContainerSource`] turns a position into a name, an opened directory
//! codec and, when the storage knows it, a modification time.
//!
//! Two sources are provided:
//!
//! - [`FileSource`]: local files, named through a [`FileResolver`]
//! - [`MemorySource`]: in-memory containers keyed by position

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tracing::debug;

use crate::codec::tiff::TiffCodec;
use crate::codec::{Diagnostics, DirectoryCodec, TracingDiagnostics};
use crate::error::PyramidError;
use crate::io::{FileRangeReader, MemoryRangeReader};

// =============================================================================
// ContainerSource Trait
// =============================================================================

/// Opens the container holding the image at sequence position `(x, y)`.
///
/// This abstraction lets the image handle work with different storage
/// backends without being tied to a specific one.
pub trait ContainerSource {
    /// The directory codec this source opens containers with.
    type Codec: DirectoryCodec;

    /// Display name of the container at `(x, y)`, used in errors and on tiles.
    fn name(&self, x: usize, y: usize) -> String;

    /// Open the container at `(x, y)`.
    ///
    /// Failures are reported as `PyramidError::Resource`.
    fn open_container(&self, x: usize, y: usize) -> Result<Self::Codec, PyramidError>;

    /// Last modification time of the container at `(x, y)`, if known.
    fn modified(&self, _x: usize, _y: usize) -> Option<SystemTime> {
        None
    }
}

// =============================================================================
// File naming
// =============================================================================

/// Maps a sequence position to a file path.
pub trait FileResolver {
    fn resolve(&self, x: usize, y: usize) -> PathBuf;
}

impl<F: FileResolver + ?Sized> FileResolver for Box<F> {
    fn resolve(&self, x: usize, y: usize) -> PathBuf {
        (**self).resolve(x, y)
    }
}

/// Every position resolves to the same file.
///
/// Used for single images and for stacks, whose layers live inside one
/// container.
#[derive(Debug, Clone)]
pub struct SingleFile {
    path: PathBuf,
}

impl SingleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileResolver for SingleFile {
    fn resolve(&self, _x: usize, _y: usize) -> PathBuf {
        self.path.clone()
    }
}

/// One file per position, named by a template.
///
/// `{x}` and `{y}` in the template are replaced with the horizontal and
/// vertical sequence numbers, e.g. `scan_{x}_{y}.tif`.
#[derive(Debug, Clone)]
pub struct SequencePattern {
    template: String,
}

impl SequencePattern {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Whether the template varies with the sequence position at all.
    pub fn has_placeholders(&self) -> bool {
        self.template.contains("{x}") || self.template.contains("{y}")
    }
}

impl FileResolver for SequencePattern {
    fn resolve(&self, x: usize, y: usize) -> PathBuf {
        PathBuf::from(
            self.template
                .replace("{x}", &x.to_string())
                .replace("{y}", &y.to_string()),
        )
    }
}

// =============================================================================
// FileSource
// =============================================================================

/// Opens TIFF files from the local filesystem.
#[derive(Clone)]
pub struct FileSource<F: FileResolver> {
    resolver: F,
    diagnostics: Arc<dyn Diagnostics>,
}

impl<F: FileResolver> FileSource<F> {
    /// Create a source whose codecs report warnings through `tracing`.
    pub fn new(resolver: F) -> Self {
        Self::with_diagnostics(resolver, Arc::new(TracingDiagnostics))
    }

    pub fn with_diagnostics(resolver: F, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            resolver,
            diagnostics,
        }
    }

    pub fn resolver(&self) -> &F {
        &self.resolver
    }
}

impl FileSource<SingleFile> {
    /// Source serving one file for every position.
    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self::new(SingleFile::new(path))
    }
}

impl<F: FileResolver> ContainerSource for FileSource<F> {
    type Codec = TiffCodec<FileRangeReader>;

    fn name(&self, x: usize, y: usize) -> String {
        self.resolver.resolve(x, y).display().to_string()
    }

    fn open_container(&self, x: usize, y: usize) -> Result<Self::Codec, PyramidError> {
        let path = self.resolver.resolve(x, y);
        let name = path.display().to_string();
        debug!(path = %name, x, y, "Opening container");

        let reader =
            FileRangeReader::open(&path).map_err(|e| PyramidError::resource(&name, e.to_string()))?;
        TiffCodec::with_diagnostics(reader, Arc::clone(&self.diagnostics))
            .map_err(|e| PyramidError::resource(&name, e.to_string()))
    }

    fn modified(&self, x: usize, y: usize) -> Option<SystemTime> {
        std::fs::metadata(self.resolver.resolve(x, y))
            .and_then(|m| m.modified())
            .ok()
    }
}

// =============================================================================
// MemorySource
// =============================================================================

/// Serves TIFF containers held in memory.
///
/// Positions without an explicit container fall back to the default one,
/// if set.
#[derive(Clone, Default)]
pub struct MemorySource {
    containers: HashMap<(usize, usize), Bytes>,
    default: Option<Bytes>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source serving the same container for every position.
    pub fn single(data: impl Into<Bytes>) -> Self {
        Self {
            containers: HashMap::new(),
            default: Some(data.into()),
        }
    }

    /// Register the container for `(x, y)`.
    pub fn with_container(mut self, x: usize, y: usize, data: impl Into<Bytes>) -> Self {
        self.containers.insert((x, y), data.into());
        self
    }

    fn lookup(&self, x: usize, y: usize) -> Option<&Bytes> {
        self.containers.get(&(x, y)).or(self.default.as_ref())
    }
}

impl ContainerSource for MemorySource {
    type Codec = TiffCodec<MemoryRangeReader>;

    fn name(&self, x: usize, y: usize) -> String {
        format!("memory:{},{}", x, y)
    }

    fn open_container(&self, x: usize, y: usize) -> Result<Self::Codec, PyramidError> {
        let name = self.name(x, y);
        let data = self
            .lookup(x, y)
            .cloned()
            .ok_or_else(|| PyramidError::resource(&name, "no container at this position"))?;

        TiffCodec::open(MemoryRangeReader::new(data, name.clone()))
            .map_err(|e| PyramidError::resource(&name, e.to_string()))
    }
}
