//! Protocol resolution index to directory locator mapping.
//!
//! Callers number resolutions smallest first (`res = 0` is the thumbnail);
//! files store them largest first. Every `res` crossing this module is
//! turned around with `native = num_resolutions - 1 - res`.

use tracing::trace;

use crate::codec::tiff::TiffTag;
use crate::codec::{DirectoryCodec, Locator, TagValue};
use crate::error::{PyramidError, TiffError};

use super::catalog::{PyramidCatalog, PyramidScheme};

/// A resolution resolved against a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedLevel {
    /// Requested protocol resolution
    pub resolution: usize,

    /// File-native level index (0 = full resolution)
    pub native_index: usize,

    pub locator: Locator,

    /// Nominal tile size from the catalog
    pub tile_width: u32,
    pub tile_height: u32,

    /// Exact level dimensions from the catalog
    pub image_width: u32,
    pub image_height: u32,
}

/// Resolve `res` against `catalog` without touching any container.
pub fn locate(catalog: &PyramidCatalog, res: usize) -> Result<LocatedLevel, PyramidError> {
    let native_index = catalog.native_index(res).ok_or_else(|| {
        PyramidError::Range(format!(
            "resolution {} does not exist: image has {} resolutions",
            res,
            catalog.num_resolutions()
        ))
    })?;
    let level = &catalog.levels[native_index];

    Ok(LocatedLevel {
        resolution: res,
        native_index,
        locator: level.locator,
        tile_width: level.tile_width,
        tile_height: level.tile_height,
        image_width: level.image_width,
        image_height: level.image_height,
    })
}

// =============================================================================
// ResolutionMapper
// =============================================================================

/// Moves a codec's directory cursor to resolved levels.
///
/// Tracks where it last left the cursor so repeated requests against the
/// same level issue no seeks.
#[derive(Debug, Default)]
pub struct ResolutionMapper {
    last_locator: Option<Locator>,

    /// SubIFD offsets of the last stack layer addressed: (directory, offsets)
    layer_sub_ifds: Option<(usize, Vec<u64>)>,
}

impl ResolutionMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locator the cursor was last moved to, if any.
    pub fn last_locator(&self) -> Option<Locator> {
        self.last_locator
    }

    /// Forget cursor state; call whenever the container is closed.
    pub fn reset(&mut self) {
        self.last_locator = None;
        self.layer_sub_ifds = None;
    }

    /// Move the cursor to resolution `res` of stack layer `layer` and check
    /// that `tile` exists there.
    ///
    /// `layer` is only consulted for stacks.
    pub fn resolve<C: DirectoryCodec + ?Sized>(
        &mut self,
        codec: &mut C,
        catalog: &PyramidCatalog,
        res: usize,
        tile: u32,
        layer: usize,
    ) -> Result<LocatedLevel, PyramidError> {
        let mut located = locate(catalog, res)?;
        located.locator = self.layer_locator(codec, catalog, &located, layer)?;
        self.seek(codec, located.locator)?;

        let count = codec.tile_count();
        if tile >= count {
            return Err(PyramidError::Range(format!(
                "tile {} does not exist: {} has {} tiles",
                tile, located.locator, count
            )));
        }

        Ok(located)
    }

    fn seek<C: DirectoryCodec + ?Sized>(&mut self, codec: &mut C, target: Locator) -> Result<(), PyramidError> {
        if self.last_locator == Some(target) {
            return Ok(());
        }

        trace!(%target, "Seeking");
        let result = match target {
            Locator::Directory(index) => codec.set_directory(index),
            Locator::SubDirectory { parent, offset } => {
                // The parent has to be current so `next_directory` resumes from it
                if codec.current_directory() != Locator::Directory(parent) {
                    codec
                        .set_directory(parent)
                        .and_then(|()| codec.set_sub_directory(offset))
                } else {
                    codec.set_sub_directory(offset)
                }
            }
        };

        match result {
            Ok(()) => {
                self.last_locator = Some(target);
                Ok(())
            }
            Err(e) => {
                self.last_locator = None;
                Err(PyramidError::seek(target, e))
            }
        }
    }

    /// Translate a catalog locator to the addressed stack layer.
    fn layer_locator<C: DirectoryCodec + ?Sized>(
        &mut self,
        codec: &mut C,
        catalog: &PyramidCatalog,
        located: &LocatedLevel,
        layer: usize,
    ) -> Result<Locator, PyramidError> {
        if !catalog.is_stack() {
            return Ok(located.locator);
        }

        let directory = catalog
            .stack
            .get(layer)
            .map(|l| l.directory)
            .ok_or_else(|| {
                PyramidError::Range(format!(
                    "layer {} does not exist: stack has {} layers",
                    layer,
                    catalog.stack.len()
                ))
            })?;

        if located.native_index == 0 {
            return Ok(Locator::Directory(directory));
        }

        match catalog.scheme {
            PyramidScheme::Normal => Ok(Locator::Directory(directory)),
            PyramidScheme::SubIfd => {
                let slot = catalog.levels[located.native_index]
                    .sub_ifd_slot
                    .unwrap_or(located.native_index - 1);
                let offsets = self.layer_sub_ifds(codec, directory)?;
                let offset = offsets.get(slot).copied().ok_or_else(|| {
                    PyramidError::Structure(TiffError::InvalidTagValue {
                        tag: TiffTag::SubIfds.name(),
                        message: format!(
                            "layer directory {} has {} SubIFDs, level needs slot {}",
                            directory,
                            offsets.len(),
                            slot
                        ),
                    })
                })?;
                Ok(Locator::SubDirectory {
                    parent: directory,
                    offset,
                })
            }
        }
    }

    /// SubIFD offsets of top-level `directory`, read once per layer.
    fn layer_sub_ifds<C: DirectoryCodec + ?Sized>(
        &mut self,
        codec: &mut C,
        directory: usize,
    ) -> Result<&[u64], PyramidError> {
        let cached = matches!(&self.layer_sub_ifds, Some((d, _)) if *d == directory);
        if !cached {
            self.seek(codec, Locator::Directory(directory))?;
            let offsets = codec
                .tag(TiffTag::SubIfds)
                .and_then(TagValue::as_u64_vec)
                .unwrap_or_default();
            self.layer_sub_ifds = Some((directory, offsets));
        }

        Ok(self
            .layer_sub_ifds
            .as_ref()
            .map(|(_, offsets)| offsets.as_slice())
            .unwrap_or(&[]))
    }
}

// =============================================================================
// Tests
// =============================================================================
