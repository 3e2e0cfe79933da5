//! Resolution levels, stack layers and resolution mapping.

mod catalog;
mod mapper;

pub use catalog::{
    default_max_value, ColourSpace, PhysicalResolution, PyramidCatalog, PyramidScheme,
    ResolutionLevel, ResolutionUnit, SampleType, StackLayer,
};
pub use mapper::{locate, LocatedLevel, ResolutionMapper};
