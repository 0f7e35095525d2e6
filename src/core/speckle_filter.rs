use crate::config::SpeckleFilterParams;
use crate::core::frost::FrostFilter;
use crate::core::gamma_map::GammaMapFilter;
use crate::core::idan::IdanFilter;
use crate::core::lee_sigma::LeeSigmaFilter;
use crate::core::local_stats::{LeeFilter, MeanFilter, MedianFilter};
use crate::core::neighborhood::{estimate_enl, source_region};
use crate::core::refined_lee::RefinedLeeFilter;
use crate::core::tile::{is_no_data, SourceTile};
use crate::io::{MemoryRaster, RasterSource};
use crate::types::{BandUnit, Rectangle, SarError, SarRealImage, SarResult};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Common contract of every speckle filter.
///
/// A filter is configured once and then invoked per output tile. It holds no
/// per-tile state, so tiles may be computed concurrently from several threads.
pub trait SpeckleFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Half-window (x, y) by which the source region extends past the output tile
    fn half_window(&self) -> (usize, usize);

    /// Filter `target` from an already fetched source tile that covers it.
    ///
    /// Returns a `[target.height][target.width]` array in the band's unit.
    fn perform_filtering(&self, source: &SourceTile, target: &Rectangle) -> SarResult<SarRealImage>;

    /// Fetch the margin-expanded source region for `target` and filter it
    fn compute_tile(
        &self,
        source: &dyn RasterSource,
        target: &Rectangle,
        band_names: &[&str],
    ) -> SarResult<SarRealImage> {
        let (width, height) = source.raster_size();
        let (half_x, half_y) = self.half_window();
        let region = source_region(
            target.x,
            target.y,
            target.width,
            target.height,
            half_x,
            half_y,
            width,
            height,
        );
        log::debug!("{}: tile {} from source region {}", self.name(), target, region);

        let tile = SourceTile::fetch(source, band_names, &region)?;
        self.perform_filtering(&tile, target)
    }
}

/// Reject tiles a filter cannot process: unsupported units, or a target not
/// covered by the fetched source region.
pub fn validate_tile(source: &SourceTile, target: &Rectangle, filter_name: &str) -> SarResult<()> {
    source.ensure_supported(filter_name)?;
    if !source.rect().contains_rect(target) {
        return Err(SarError::Processing(format!(
            "{}: target tile {} is not covered by source region {}",
            filter_name,
            target,
            source.rect()
        )));
    }
    Ok(())
}

/// Filter windows must have odd, non-zero sides
pub fn validate_window_size(filter_name: &str, size_x: usize, size_y: usize) -> SarResult<()> {
    if size_x == 0 || size_y == 0 || size_x % 2 == 0 || size_y % 2 == 0 {
        return Err(SarError::InvalidParameter(format!(
            "{}: please choose an odd number for filter size, got {}x{}",
            filter_name, size_x, size_y
        )));
    }
    Ok(())
}

pub fn validate_enl(enl: f64) -> SarResult<()> {
    if !enl.is_finite() || enl <= 0.0 {
        return Err(SarError::InvalidParameter(format!(
            "Equivalent number of looks must be positive, got {}",
            enl
        )));
    }
    Ok(())
}

/// Available speckle filter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SpeckleFilterType {
    /// Copy the source band unchanged
    None,
    /// Boxcar mean
    Mean,
    /// Rank filter
    Median,
    /// Exponential distance weighting
    Frost,
    /// Maximum A Posteriori under Gamma statistics
    GammaMap,
    /// Classic local-statistics Lee filter
    Lee,
    /// Edge-aligned Lee filter on a fixed 7x7 window
    RefinedLee,
    /// Improved Lee Sigma with point-target preservation
    LeeSigma,
    /// Intensity-driven adaptive neighborhood
    Idan,
}

impl SpeckleFilterType {
    pub const ALL: [SpeckleFilterType; 9] = [
        SpeckleFilterType::None,
        SpeckleFilterType::Mean,
        SpeckleFilterType::Median,
        SpeckleFilterType::Frost,
        SpeckleFilterType::GammaMap,
        SpeckleFilterType::Lee,
        SpeckleFilterType::RefinedLee,
        SpeckleFilterType::LeeSigma,
        SpeckleFilterType::Idan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeckleFilterType::None => "None",
            SpeckleFilterType::Mean => "Mean",
            SpeckleFilterType::Median => "Median",
            SpeckleFilterType::Frost => "Frost",
            SpeckleFilterType::GammaMap => "Gamma Map",
            SpeckleFilterType::Lee => "Lee",
            SpeckleFilterType::RefinedLee => "Refined Lee",
            SpeckleFilterType::LeeSigma => "Lee Sigma",
            SpeckleFilterType::Idan => "IDAN",
        }
    }
}

impl std::fmt::Display for SpeckleFilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeckleFilterType {
    type Err = SarError;

    /// Accepts display names and their common spellings, ignoring case,
    /// spaces, underscores and hyphens ("Gamma Map", "gamma_map", "GammaMAP").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "none" => Ok(SpeckleFilterType::None),
            "mean" | "boxcar" => Ok(SpeckleFilterType::Mean),
            "median" => Ok(SpeckleFilterType::Median),
            "frost" => Ok(SpeckleFilterType::Frost),
            "gammamap" => Ok(SpeckleFilterType::GammaMap),
            "lee" => Ok(SpeckleFilterType::Lee),
            "refinedlee" => Ok(SpeckleFilterType::RefinedLee),
            "leesigma" | "improvedleesigma" | "improvedleesigmafilter" => Ok(SpeckleFilterType::LeeSigma),
            "idan" => Ok(SpeckleFilterType::Idan),
            _ => Err(SarError::InvalidParameter(format!("Unknown speckle filter: {}", s))),
        }
    }
}

impl TryFrom<String> for SpeckleFilterType {
    type Error = SarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SpeckleFilterType> for String {
    fn from(value: SpeckleFilterType) -> Self {
        value.as_str().to_string()
    }
}

/// Pass-through: copies the source band (complex pairs become intensity)
#[derive(Debug, Clone, Default)]
pub struct NoFilter;

impl SpeckleFilter for NoFilter {
    fn name(&self) -> &'static str {
        "None"
    }

    fn half_window(&self) -> (usize, usize) {
        (0, 0)
    }

    fn perform_filtering(&self, source: &SourceTile, target: &Rectangle) -> SarResult<SarRealImage> {
        validate_tile(source, target, self.name())?;
        let nd = source.no_data_value();
        Ok(Array2::from_shape_fn((target.height, target.width), |(r, c)| {
            let v = source.native((target.x + c) as i64, (target.y + r) as i64);
            if is_no_data(v, nd) {
                nd
            } else {
                source.encode_native(v)
            }
        }))
    }
}

/// Build the filter selected by `params`, validating its parameters eagerly
pub fn create_filter(params: &SpeckleFilterParams) -> SarResult<Box<dyn SpeckleFilter>> {
    let filter: Box<dyn SpeckleFilter> = match params.filter {
        SpeckleFilterType::None => Box::new(NoFilter),
        SpeckleFilterType::Mean => Box::new(MeanFilter::new(params.filter_size_x, params.filter_size_y)?),
        SpeckleFilterType::Median => Box::new(MedianFilter::new(params.filter_size_x, params.filter_size_y)?),
        SpeckleFilterType::Frost => Box::new(FrostFilter::new(
            params.filter_size_x,
            params.filter_size_y,
            params.damping_factor,
        )?),
        SpeckleFilterType::GammaMap => Box::new(GammaMapFilter::new(
            params.filter_size_x,
            params.filter_size_y,
            params.estimate_enl,
            params.enl,
        )?),
        SpeckleFilterType::Lee => Box::new(LeeFilter::new(
            params.filter_size_x,
            params.filter_size_y,
            params.estimate_enl,
            params.enl,
        )?),
        SpeckleFilterType::RefinedLee => Box::new(RefinedLeeFilter::new()),
        SpeckleFilterType::LeeSigma => Box::new(LeeSigmaFilter::from_strings(
            &params.num_looks_str,
            params.window_size()?,
            params.target_window_size()?,
            &params.sigma_str,
        )?),
        SpeckleFilterType::Idan => Box::new(IdanFilter::from_strings(params.an_size, &params.num_looks_str)?),
    };
    Ok(filter)
}

/// Whole-band driver: splits the raster into tiles and filters them in parallel
pub struct SpeckleFilterProcessor {
    params: SpeckleFilterParams,
    filter: Box<dyn SpeckleFilter>,
}

impl SpeckleFilterProcessor {
    pub fn new(params: SpeckleFilterParams) -> SarResult<Self> {
        if params.tile_size == 0 {
            return Err(SarError::InvalidParameter("Tile size must be positive".to_string()));
        }
        let filter = create_filter(&params)?;
        log::debug!("Speckle filter parameters: {:?}", params);
        Ok(Self { params, filter })
    }

    /// Processor for `filter_type` with otherwise default parameters
    pub fn with_filter(filter_type: SpeckleFilterType) -> SarResult<Self> {
        Self::new(SpeckleFilterParams::for_filter(filter_type))
    }

    pub fn params(&self) -> &SpeckleFilterParams {
        &self.params
    }

    pub fn filter(&self) -> &dyn SpeckleFilter {
        self.filter.as_ref()
    }

    /// Row-major `tile_size` squares covering a `width x height` raster
    pub fn tiles(&self, width: usize, height: usize) -> Vec<Rectangle> {
        let size = self.params.tile_size;
        let mut tiles = Vec::with_capacity(width.div_ceil(size) * height.div_ceil(size));
        for y in (0..height).step_by(size) {
            for x in (0..width).step_by(size) {
                tiles.push(Rectangle::new(x, y, size.min(width - x), size.min(height - y)));
            }
        }
        tiles
    }

    /// Filter one output band. `band_names` holds one detected band or an
    /// in-phase/quadrature pair.
    pub fn filter_band(&self, source: &dyn RasterSource, band_names: &[&str]) -> SarResult<SarRealImage> {
        let (width, height) = source.raster_size();
        let tiles = self.tiles(width, height);
        log::info!(
            "Applying {} speckle filter to {:?} ({}x{}, {} tiles)",
            self.filter.name(),
            band_names,
            width,
            height,
            tiles.len()
        );

        let results = self.compute_tiles(source, band_names, &tiles)?;

        let mut output = Array2::zeros((height, width));
        for (tile, data) in tiles.iter().zip(results) {
            output
                .slice_mut(s![tile.y..tile.max_y(), tile.x..tile.max_x()])
                .assign(&data);
        }

        log::info!("Speckle filtering completed successfully");
        Ok(output)
    }

    #[cfg(feature = "parallel")]
    fn compute_tiles(
        &self,
        source: &dyn RasterSource,
        band_names: &[&str],
        tiles: &[Rectangle],
    ) -> SarResult<Vec<SarRealImage>> {
        use rayon::prelude::*;

        tiles
            .par_iter()
            .map(|tile| self.filter.compute_tile(source, tile, band_names))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn compute_tiles(
        &self,
        source: &dyn RasterSource,
        band_names: &[&str],
        tiles: &[Rectangle],
    ) -> SarResult<Vec<SarRealImage>> {
        tiles
            .iter()
            .map(|tile| self.filter.compute_tile(source, tile, band_names))
            .collect()
    }

    /// Filter a single in-memory band
    pub fn filter_array(&self, image: &SarRealImage, unit: BandUnit, no_data_value: f64) -> SarResult<SarRealImage> {
        let raster = MemoryRaster::from_array("band", image.clone(), unit, no_data_value)?;
        self.filter_band(&raster, &["band"])
    }

    /// Moment-based equivalent number of looks of a whole image
    pub fn estimate_number_of_looks(image: &SarRealImage, unit: BandUnit, no_data_value: f64) -> SarResult<f64> {
        let (rows, cols) = image.dim();
        let rect = Rectangle::new(0, 0, cols, rows);
        let tile = SourceTile::new(rect, image.clone(), unit, no_data_value)?;
        tile.ensure_supported("ENL estimation")?;

        let enl = estimate_enl(&tile, &rect);
        log::info!("Estimated equivalent number of looks: {:.2}", enl);
        Ok(enl)
    }
}
