//! # tiled-pyramid
//!
//! Resolution and tile addressing for tiled pyramidal TIFF images.
//!
//! Clients ask for tiles by *protocol* resolution, where `0` is the
//! smallest image and `num_resolutions - 1` the full-resolution one, and by
//! row-major tile index. This library works out which TIFF directory holds
//! the requested level, moves the container's directory cursor there only
//! when needed, decodes the tile and hands back samples in a canonical
//! layout.
//!
//! ## Features
//!
//! - **Two pyramid layouts**: levels as sibling top-level directories, or
//!   nested in directory 0's SubIFDs
//! - **Image stacks**: equal-sized page directories addressed as layers
//! - **Tile normalisation**: bilevel expansion, palette and planar handling,
//!   boundary cropping
//! - **Built-in TIFF codec**: classic TIFF and BigTIFF, uncompressed,
//!   PackBits, LZW, Deflate and JPEG tiles
//!
//! ## Architecture
//!
//! - [`io`] - positioned reads over files and memory
//! - [`codec`] - the `DirectoryCodec` capability and its TIFF implementation
//! - [`pyramid`] - catalog building and resolution mapping
//! - [`tile`] - tile normalisation and image file encoding
//! - [`source`] - opening containers by sequence position
//! - [`handle`] - the image handle tying the pieces together
//! - [`config`] - CLI configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tiled_pyramid::{FileSource, ImageHandle};
//!
//! let mut handle = ImageHandle::new(FileSource::single("image.tif"));
//! handle.open(0, 0)?;
//! println!("{} resolutions", handle.num_resolutions());
//!
//! // Top-left tile of the smallest resolution
//! let tile = handle.get_tile(0, 0, 0, 0)?;
//! println!("{}x{} pixels, {} bytes", tile.width, tile.height, tile.data_length);
//! # Ok::<(), tiled_pyramid::PyramidError>(())
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod io;
pub mod pyramid;
pub mod source;
pub mod tile;

// Re-export commonly used types
pub use codec::tiff::{TiffCodec, TiffTag};
pub use codec::{
    DecodeOption, Diagnostics, DirectoryCodec, Locator, TagValue, TracingDiagnostics,
};
pub use error::{EncodeError, IoError, PyramidError, TiffError};
pub use handle::ImageHandle;
pub use io::{FileRangeReader, MemoryRangeReader, RangeReader};
pub use pyramid::{
    default_max_value, locate, ColourSpace, LocatedLevel, PhysicalResolution, PyramidCatalog,
    PyramidScheme, ResolutionLevel, ResolutionMapper, ResolutionUnit, SampleType, StackLayer,
};
pub use source::{
    ContainerSource, FileResolver, FileSource, MemorySource, SequencePattern, SingleFile,
};
pub use tile::{OutputFormat, Tile, TileEncoder};
