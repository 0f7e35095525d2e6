use crate::core::neighborhood::{map_windows, Neighborhood, DOUBLE_MIN};
use crate::core::speckle_filter::{validate_tile, validate_window_size, SpeckleFilter};
use crate::core::tile::{is_no_data, SourceTile};
use crate::types::{Rectangle, SarError, SarRealImage, SarResult};

/// Frost filter: exponentially damped weighted average, weights falling off
/// with the Chebyshev distance from the window center.
#[derive(Debug, Clone)]
pub struct FrostFilter {
    filter_size_x: usize,
    filter_size_y: usize,
    damping_factor: f64,
    /// Chebyshev distance of each window position from the center, row-major
    distance_mask: Vec<f64>,
}

impl FrostFilter {
    pub fn new(filter_size_x: usize, filter_size_y: usize, damping_factor: f64) -> SarResult<Self> {
        validate_window_size("Frost", filter_size_x, filter_size_y)?;
        if !damping_factor.is_finite() || damping_factor < 0.0 {
            return Err(SarError::InvalidParameter(format!(
                "Frost damping factor must be a non-negative number, got {}",
                damping_factor
            )));
        }

        let half_x = (filter_size_x / 2) as i64;
        let half_y = (filter_size_y / 2) as i64;
        let mut distance_mask = Vec::with_capacity(filter_size_x * filter_size_y);
        for row in 0..filter_size_y as i64 {
            for col in 0..filter_size_x as i64 {
                let d = (row - half_y).abs().max((col - half_x).abs());
                distance_mask.push(d as f64);
            }
        }

        log::debug!(
            "Frost filter {}x{} with damping factor {}",
            filter_size_x,
            filter_size_y,
            damping_factor
        );

        Ok(Self {
            filter_size_x,
            filter_size_y,
            damping_factor,
            distance_mask,
        })
    }

    pub fn damping_factor(&self) -> f64 {
        self.damping_factor
    }

    fn frost_value(&self, neighborhood: &Neighborhood) -> f64 {
        let mean = neighborhood.mean();
        if mean <= DOUBLE_MIN {
            return mean;
        }

        let var = neighborhood.variance(mean);
        if var <= DOUBLE_MIN {
            return mean;
        }

        let k = self.damping_factor * var / (mean * mean);
        let nd = neighborhood.no_data_value();

        let mut sum = 0.0;
        let mut total_weight = 0.0;
        for (&v, &d) in neighborhood.values().iter().zip(&self.distance_mask) {
            if !is_no_data(v, nd) {
                let weight = (-k * d).exp();
                sum += weight * v;
                total_weight += weight;
            }
        }
        sum / total_weight
    }
}

impl SpeckleFilter for FrostFilter {
    fn name(&self) -> &'static str {
        "Frost"
    }

    fn half_window(&self) -> (usize, usize) {
        (self.filter_size_x / 2, self.filter_size_y / 2)
    }

    fn perform_filtering(&self, source: &SourceTile, target: &Rectangle) -> SarResult<SarRealImage> {
        validate_tile(source, target, self.name())?;
        let (half_x, half_y) = self.half_window();
        Ok(map_windows(source, target, half_x, half_y, |nb| self.frost_value(nb)))
    }
}
