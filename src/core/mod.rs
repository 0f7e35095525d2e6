//! Speckle filters and the primitives they share

pub mod frost;
pub mod gamma_map;
pub mod idan;
pub mod lee_sigma;
pub mod local_stats;
pub mod neighborhood;
pub mod refined_lee;
pub mod speckle_filter;
pub mod tile;

// Re-export main types
pub use frost::FrostFilter;
pub use gamma_map::GammaMapFilter;
pub use idan::IdanFilter;
pub use lee_sigma::{LeeSigmaFilter, SigmaLevel, SigmaRange};
pub use local_stats::{LeeFilter, MeanFilter, MedianFilter};
pub use neighborhood::{collect_neighborhood, estimate_enl, source_region, Neighborhood};
pub use refined_lee::RefinedLeeFilter;
pub use speckle_filter::{create_filter, NoFilter, SpeckleFilter, SpeckleFilterProcessor, SpeckleFilterType};
pub use tile::{SampleDomain, SourceTile};
