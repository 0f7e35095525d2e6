//! Plain local-statistics filters: boxcar mean, median and the classic Lee filter

use crate::core::neighborhood::{estimate_enl, map_windows, Neighborhood, DOUBLE_MIN};
use crate::core::speckle_filter::{validate_enl, validate_tile, validate_window_size, SpeckleFilter};
use crate::core::tile::SourceTile;
use crate::types::{Rectangle, SarRealImage, SarResult};

/// Boxcar average of the valid samples in the window
#[derive(Debug, Clone)]
pub struct MeanFilter {
    filter_size_x: usize,
    filter_size_y: usize,
}

impl MeanFilter {
    pub fn new(filter_size_x: usize, filter_size_y: usize) -> SarResult<Self> {
        validate_window_size("Mean", filter_size_x, filter_size_y)?;
        Ok(Self {
            filter_size_x,
            filter_size_y,
        })
    }
}

impl SpeckleFilter for MeanFilter {
    fn name(&self) -> &'static str {
        "Mean"
    }

    fn half_window(&self) -> (usize, usize) {
        (self.filter_size_x / 2, self.filter_size_y / 2)
    }

    fn perform_filtering(&self, source: &SourceTile, target: &Rectangle) -> SarResult<SarRealImage> {
        validate_tile(source, target, self.name())?;
        let (half_x, half_y) = self.half_window();
        Ok(map_windows(source, target, half_x, half_y, Neighborhood::mean))
    }
}

#[derive(Debug, Clone)]
pub struct MedianFilter {
    filter_size_x: usize,
    filter_size_y: usize,
}

impl MedianFilter {
    pub fn new(filter_size_x: usize, filter_size_y: usize) -> SarResult<Self> {
        validate_window_size("Median", filter_size_x, filter_size_y)?;
        Ok(Self {
            filter_size_x,
            filter_size_y,
        })
    }
}

/// Upper median of the valid samples (`sorted[n / 2]`)
pub fn median_of(neighborhood: &Neighborhood, scratch: &mut Vec<f64>) -> f64 {
    scratch.clear();
    scratch.extend(neighborhood.valid_values());
    scratch.sort_by(|a, b| a.total_cmp(b));
    scratch[scratch.len() / 2]
}

impl SpeckleFilter for MedianFilter {
    fn name(&self) -> &'static str {
        "Median"
    }

    fn half_window(&self) -> (usize, usize) {
        (self.filter_size_x / 2, self.filter_size_y / 2)
    }

    fn perform_filtering(&self, source: &SourceTile, target: &Rectangle) -> SarResult<SarRealImage> {
        validate_tile(source, target, self.name())?;
        let (half_x, half_y) = self.half_window();
        let mut scratch = Vec::with_capacity(self.filter_size_x * self.filter_size_y);
        Ok(map_windows(source, target, half_x, half_y, |nb| median_of(nb, &mut scratch)))
    }
}

/// Lee filter: blends the center toward the local mean by how far the local
/// coefficient of variation exceeds that of pure speckle.
#[derive(Debug, Clone)]
pub struct LeeFilter {
    filter_size_x: usize,
    filter_size_y: usize,
    estimate_enl: bool,
    enl: f64,
}

impl LeeFilter {
    pub fn new(filter_size_x: usize, filter_size_y: usize, estimate_enl: bool, enl: f64) -> SarResult<Self> {
        validate_window_size("Lee", filter_size_x, filter_size_y)?;
        if !estimate_enl {
            validate_enl(enl)?;
        }
        Ok(Self {
            filter_size_x,
            filter_size_y,
            estimate_enl,
            enl,
        })
    }

    fn lee_value(cu: f64, neighborhood: &Neighborhood) -> f64 {
        let mean = neighborhood.mean();
        if mean <= DOUBLE_MIN {
            return mean;
        }

        let var = neighborhood.variance(mean);
        if var <= DOUBLE_MIN {
            return mean;
        }

        let ci = var.sqrt() / mean;
        if ci < cu {
            return mean;
        }

        let w = 1.0 - (cu * cu) / (ci * ci);
        neighborhood.center() * w + mean * (1.0 - w)
    }
}

impl SpeckleFilter for LeeFilter {
    fn name(&self) -> &'static str {
        "Lee"
    }

    fn half_window(&self) -> (usize, usize) {
        (self.filter_size_x / 2, self.filter_size_y / 2)
    }

    fn perform_filtering(&self, source: &SourceTile, target: &Rectangle) -> SarResult<SarRealImage> {
        validate_tile(source, target, self.name())?;
        let enl = if self.estimate_enl {
            estimate_enl(source, target)
        } else {
            self.enl
        };
        let cu = 1.0 / enl.sqrt();

        let (half_x, half_y) = self.half_window();
        Ok(map_windows(source, target, half_x, half_y, |nb| Self::lee_value(cu, nb)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BandUnit;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn tile(data: Array2<f64>, no_data: f64) -> SourceTile {
        let (rows, cols) = data.dim();
        SourceTile::new(Rectangle::new(0, 0, cols, rows), data, BandUnit::Intensity, no_data).unwrap()
    }

    #[test]
    fn test_mean_skips_no_data() {
        let mut data = Array2::from_elem((3, 3), 2.0);
        data[[0, 0]] = -1.0;
        data[[2, 2]] = 11.0;
        let out = MeanFilter::new(3, 3)
            .unwrap()
            .perform_filtering(&tile(data, -1.0), &Rectangle::new(1, 1, 1, 1))
            .unwrap();
        assert_relative_eq!(out[[0, 0]], (7.0 * 2.0 + 11.0) / 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_median_upper_middle() {
        let data = Array2::from_shape_vec((1, 4), vec![4.0, 1.0, 3.0, 2.0]).unwrap();
        let out = MedianFilter::new(3, 1)
            .unwrap()
            .perform_filtering(&tile(data, 0.0), &Rectangle::new(1, 0, 2, 1))
            .unwrap();
        // windows {4,1,3} and {1,3,2}
        assert_eq!(out[[0, 0]], 3.0);
        assert_eq!(out[[0, 1]], 2.0);
    }

    #[test]
    fn test_median_rejects_outlier() {
        let mut data = Array2::from_elem((3, 3), 5.0);
        data[[1, 1]] = 900.0;
        let out = MedianFilter::new(3, 3)
            .unwrap()
            .perform_filtering(&tile(data, 0.0), &Rectangle::new(1, 1, 1, 1))
            .unwrap();
        assert_eq!(out[[0, 0]], 5.0);
    }

    #[test]
    fn test_lee_homogeneous_and_edge() {
        let filter = LeeFilter::new(3, 3, false, 1.0).unwrap();
        let flat = tile(Array2::from_elem((3, 3), 8.0), 0.0);
        let out = filter.perform_filtering(&flat, &Rectangle::new(1, 1, 1, 1)).unwrap();
        assert_eq!(out[[0, 0]], 8.0);

        // strong outlier with high ENL keeps most of the center value
        let mut data = Array2::from_elem((3, 3), 1.0);
        data[[1, 1]] = 100.0;
        let filter = LeeFilter::new(3, 3, false, 100.0).unwrap();
        let out = filter.perform_filtering(&tile(data, 0.0), &Rectangle::new(1, 1, 1, 1)).unwrap();
        assert!(out[[0, 0]] > 90.0 && out[[0, 0]] < 100.0);
    }
}
