//! Raster access for the speckle filters

pub mod raster;

pub use raster::{BandRegion, MemoryRaster, RasterSource};
