use crate::types::{BandUnit, Rectangle, SarError, SarImage, SarRealImage, SarResult};
use ndarray::{s, Array2};
use num_traits::ToPrimitive;
use std::collections::HashMap;

/// Pixels of one band over a requested region, with the band's metadata
#[derive(Debug, Clone)]
pub struct BandRegion {
    /// Region actually delivered (requests are clamped to the raster bounds)
    pub rect: Rectangle,
    /// Samples, `rect.height` rows by `rect.width` columns
    pub data: SarRealImage,
    pub no_data_value: f64,
    pub unit: BandUnit,
}

/// Read access to source rasters.
///
/// Implementations must be safe for concurrent reads: the image driver fetches
/// regions for independent tiles from several threads at once.
pub trait RasterSource: Sync {
    /// Raster dimensions as (width, height)
    fn raster_size(&self) -> (usize, usize);

    /// Fetch `region` of `band_name`, clamped to the raster bounds
    fn fetch_region(&self, band_name: &str, region: &Rectangle) -> SarResult<BandRegion>;
}

#[derive(Debug, Clone)]
struct MemoryBand {
    data: SarRealImage,
    no_data_value: f64,
    unit: BandUnit,
}

/// Raster held entirely in memory, one `Array2` per named band
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    width: usize,
    height: usize,
    bands: HashMap<String, MemoryBand>,
}

impl MemoryRaster {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bands: HashMap::new(),
        }
    }

    /// Build a single-band raster from an array shaped (rows, cols)
    pub fn from_array(
        band_name: &str,
        data: SarRealImage,
        unit: BandUnit,
        no_data_value: f64,
    ) -> SarResult<Self> {
        let (rows, cols) = data.dim();
        let mut raster = Self::new(cols, rows);
        raster.add_band(band_name, data, unit, no_data_value)?;
        Ok(raster)
    }

    pub fn add_band(
        &mut self,
        band_name: &str,
        data: SarRealImage,
        unit: BandUnit,
        no_data_value: f64,
    ) -> SarResult<()> {
        let (rows, cols) = data.dim();
        if rows != self.height || cols != self.width {
            return Err(SarError::Processing(format!(
                "Band '{}' is {}x{} but raster is {}x{}",
                band_name, cols, rows, self.width, self.height
            )));
        }

        log::debug!("Adding {} band '{}' ({}x{})", unit, band_name, cols, rows);
        self.bands.insert(
            band_name.to_string(),
            MemoryBand {
                data,
                no_data_value,
                unit,
            },
        );
        Ok(())
    }

    /// Add a band from any numeric sample type (e.g. `u16` DN or `f32` amplitude)
    pub fn add_band_from<T>(
        &mut self,
        band_name: &str,
        data: &Array2<T>,
        unit: BandUnit,
        no_data_value: f64,
    ) -> SarResult<()>
    where
        T: ToPrimitive + Copy,
    {
        let converted = data.mapv(|v| v.to_f64().unwrap_or(no_data_value));
        self.add_band(band_name, converted, unit, no_data_value)
    }

    /// Split complex SLC samples into a `Real` / `Imaginary` band pair
    pub fn add_complex_bands(
        &mut self,
        i_band_name: &str,
        q_band_name: &str,
        data: &SarImage,
        no_data_value: f64,
    ) -> SarResult<()> {
        self.add_band(i_band_name, data.mapv(|c| c.re), BandUnit::Real, no_data_value)?;
        self.add_band(q_band_name, data.mapv(|c| c.im), BandUnit::Imaginary, no_data_value)
    }

    pub fn band_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bands.keys().cloned().collect();
        names.sort();
        names
    }
}

impl RasterSource for MemoryRaster {
    fn raster_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn fetch_region(&self, band_name: &str, region: &Rectangle) -> SarResult<BandRegion> {
        let band = self
            .bands
            .get(band_name)
            .ok_or_else(|| SarError::BandNotFound(band_name.to_string()))?;

        let rect = region.clamp_to(self.width, self.height);
        let data = band
            .data
            .slice(s![rect.y..rect.max_y(), rect.x..rect.max_x()])
            .to_owned();

        Ok(BandRegion {
            rect,
            data,
            no_data_value: band.no_data_value,
            unit: band.unit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SarComplex;

    #[test]
    fn test_fetch_region_is_clamped() {
        let data = Array2::from_shape_fn((10, 8), |(r, c)| (r * 8 + c) as f64);
        let raster = MemoryRaster::from_array("Intensity_VV", data, BandUnit::Intensity, 0.0).unwrap();

        let region = raster
            .fetch_region("Intensity_VV", &Rectangle::new(6, 7, 5, 5))
            .unwrap();
        assert_eq!(region.rect, Rectangle::new(6, 7, 2, 3));
        assert_eq!(region.data.dim(), (3, 2));
        assert_eq!(region.data[[0, 0]], (7 * 8 + 6) as f64);
        assert_eq!(region.unit, BandUnit::Intensity);
    }

    #[test]
    fn test_missing_band() {
        let raster = MemoryRaster::new(4, 4);
        let result = raster.fetch_region("Amplitude_HH", &Rectangle::new(0, 0, 4, 4));
        assert!(matches!(result, Err(SarError::BandNotFound(_))));
    }

    #[test]
    fn test_band_dimension_mismatch() {
        let mut raster = MemoryRaster::new(4, 4);
        let result = raster.add_band("a", Array2::zeros((3, 4)), BandUnit::Amplitude, 0.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_complex_and_integer_bands() {
        let mut raster = MemoryRaster::new(3, 2);
        let slc = Array2::from_elem((2, 3), SarComplex::new(3.0, 4.0));
        raster.add_complex_bands("i_VV", "q_VV", &slc, 0.0).unwrap();
        raster
            .add_band_from("DN", &Array2::<u16>::from_elem((2, 3), 7), BandUnit::Amplitude, 0.0)
            .unwrap();

        assert_eq!(raster.band_names(), vec!["DN", "i_VV", "q_VV"]);
        let q = raster.fetch_region("q_VV", &Rectangle::new(0, 0, 3, 2)).unwrap();
        assert_eq!(q.unit, BandUnit::Imaginary);
        assert_eq!(q.data[[1, 2]], 4.0);
    }
}
