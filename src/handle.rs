//! Image handles.
//!
//! An [`ImageHandle`] owns at most one open container at a time, the
//! catalog built from it and the resolution mapper that tracks where the
//! container's directory cursor sits.
//!
//! # Lifecycle
//!
//! ```text
//!            open(x, y)                get_tile(other x, y)
//!  Closed ─────────────────▶ Open ─────────────────────────▶ close + open
//!    ▲                        │
//!    └──────── close() ───────┘
//! ```
//!
//! The catalog survives `close()`, so a closed handle can still be
//! inspected. It is rebuilt when a different position is opened or the
//! container was modified since it was built.
//!
//! Stacks are the exception to reopening: their layers live inside one
//! container, so `get_tile` picks the layer `x` by moving the directory
//! cursor within the container that is already open.

use std::collections::BTreeMap;
use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::PyramidError;
use crate::pyramid::{
    ColourSpace, PhysicalResolution, PyramidCatalog, ResolutionMapper, SampleType, StackLayer,
};
use crate::source::ContainerSource;
use crate::tile::{decode_normalized, Tile};

/// Container opened by a handle.
struct OpenContainer<C> {
    codec: C,
    position: (usize, usize),
    name: String,
    timestamp: Option<SystemTime>,
}

/// Catalog together with the container it was built from.
struct BuiltCatalog {
    catalog: PyramidCatalog,
    position: (usize, usize),
    timestamp: Option<SystemTime>,
}

/// Tiled pyramidal image reachable through a container source.
///
/// Every method that moves the directory cursor takes `&mut self`; a handle
/// serves one request at a time.
pub struct ImageHandle<S: ContainerSource> {
    source: S,
    open: Option<OpenContainer<S::Codec>>,
    built: Option<BuiltCatalog>,
    mapper: ResolutionMapper,
}

impl<S: ContainerSource> ImageHandle<S> {
    /// Create a closed handle.
    pub fn new(source: S) -> Self {
        Self {
            source,
            open: None,
            built: None,
            mapper: ResolutionMapper::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Sequence position of the open container.
    pub fn position(&self) -> Option<(usize, usize)> {
        self.open.as_ref().map(|o| o.position)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the container at `(x, y)` and make sure a catalog exists for it.
    ///
    /// Fails with `Resource` if the handle is already open or the container
    /// cannot be opened, and with `Structure` if its base image is not tiled.
    pub fn open(&mut self, x: usize, y: usize) -> Result<(), PyramidError> {
        let name = self.source.name(x, y);
        if let Some(open) = &self.open {
            return Err(PyramidError::resource(
                name,
                format!("handle already has {} open", open.name),
            ));
        }

        let mut codec = self.source.open_container(x, y)?;
        let timestamp = self.source.modified(x, y);

        let stale = match &self.built {
            Some(built) => {
                built.position != (x, y)
                    || (built.timestamp.is_some() && timestamp.is_some() && built.timestamp != timestamp)
            }
            None => true,
        };

        if stale {
            let catalog = match PyramidCatalog::build(&mut codec) {
                Ok(catalog) => catalog,
                Err(err) => {
                    // The old catalog describes another container
                    self.built = None;
                    return Err(err);
                }
            };
            debug!(
                name = %name,
                resolutions = catalog.num_resolutions(),
                layers = catalog.stack.len(),
                "Catalog built"
            );
            self.built = Some(BuiltCatalog {
                catalog,
                position: (x, y),
                timestamp,
            });
        }

        self.mapper.reset();
        info!(name = %name, x, y, "Opened image");
        self.open = Some(OpenContainer {
            codec,
            position: (x, y),
            name,
            timestamp,
        });
        Ok(())
    }

    /// Release the open container. Closing a closed handle does nothing.
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            info!(name = %open.name, "Closed image");
        }
        self.mapper.reset();
    }

    // =========================================================================
    // Tiles
    // =========================================================================

    /// Decode tile `tile` of protocol resolution `res` for position `(x, y)`.
    ///
    /// Opens lazily. For stacks `x` selects the layer and `y` is ignored.
    pub fn get_tile(&mut self, x: usize, y: usize, res: usize, tile: u32) -> Result<Tile, PyramidError> {
        let (container, layer) = match &self.built {
            Some(built) if built.catalog.is_stack() => (built.position, x),
            _ => ((x, y), 0),
        };

        if self.position() != Some(container) {
            if self.is_open() {
                debug!(from = ?self.position(), to = ?container, "Switching container");
                self.close();
            }
            self.open(container.0, container.1)?;
        }

        let (Some(open), Some(built)) = (self.open.as_mut(), self.built.as_ref()) else {
            return Err(PyramidError::resource(self.source.name(x, y), "image is not open"));
        };
        let catalog = &built.catalog;

        let located = self.mapper.resolve(&mut open.codec, catalog, res, tile, layer)?;
        let samples = decode_normalized(&mut open.codec, &located, tile, &open.name)?;

        Ok(Tile::new(
            x,
            y,
            res,
            tile,
            samples,
            catalog.sample_type,
            open.name.clone(),
            open.timestamp,
        ))
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Catalog of the most recently opened container.
    pub fn catalog(&self) -> Option<&PyramidCatalog> {
        self.built.as_ref().map(|b| &b.catalog)
    }

    pub fn num_resolutions(&self) -> usize {
        self.catalog().map_or(0, PyramidCatalog::num_resolutions)
    }

    /// Image size at each resolution, smallest first.
    pub fn dimensions(&self) -> Vec<(u32, u32)> {
        self.catalog().map(PyramidCatalog::dimensions).unwrap_or_default()
    }

    pub fn tile_size(&self) -> Option<(u32, u32)> {
        self.catalog().map(PyramidCatalog::tile_size)
    }

    pub fn colour_space(&self) -> Option<ColourSpace> {
        self.catalog().map(|c| c.colour_space)
    }

    pub fn bits_per_channel(&self) -> Option<u32> {
        self.catalog().map(|c| c.bits_per_channel)
    }

    pub fn channels(&self) -> Option<u32> {
        self.catalog().map(|c| c.channels)
    }

    pub fn sample_type(&self) -> Option<SampleType> {
        self.catalog().map(|c| c.sample_type)
    }

    pub fn metadata(&self) -> Option<&BTreeMap<String, String>> {
        self.catalog().map(|c| &c.metadata)
    }

    pub fn min_values(&self) -> &[f32] {
        self.catalog().map(|c| c.min_values.as_slice()).unwrap_or(&[])
    }

    pub fn max_values(&self) -> &[f32] {
        self.catalog().map(|c| c.max_values.as_slice()).unwrap_or(&[])
    }

    pub fn stack(&self) -> &[StackLayer] {
        self.catalog().map(|c| c.stack.as_slice()).unwrap_or(&[])
    }

    pub fn physical_resolution(&self) -> Option<PhysicalResolution> {
        self.catalog().and_then(|c| c.resolution)
    }

    pub fn icc_profile(&self) -> Option<&Bytes> {
        self.catalog().and_then(|c| c.icc_profile.as_ref())
    }
}

// =============================================================================
// Tests
// =============================================================================
