use crate::core::neighborhood::{estimate_enl, map_windows, Neighborhood, DOUBLE_MIN};
use crate::core::speckle_filter::{validate_enl, validate_tile, validate_window_size, SpeckleFilter};
use crate::core::tile::SourceTile;
use crate::types::{Rectangle, SarRealImage, SarResult};

/// Gamma-MAP filter: maximum a posteriori estimate assuming Gamma-distributed
/// speckle and scene reflectivity.
#[derive(Debug, Clone)]
pub struct GammaMapFilter {
    filter_size_x: usize,
    filter_size_y: usize,
    estimate_enl: bool,
    enl: f64,
}

/// Noise statistics derived from an ENL value
#[derive(Debug, Clone, Copy)]
struct SpeckleModel {
    enl: f64,
    cu: f64,
    cu2: f64,
    cmax: f64,
}

impl SpeckleModel {
    fn new(enl: f64) -> Self {
        let cu = 1.0 / enl.sqrt();
        Self {
            enl,
            cu,
            cu2: cu * cu,
            cmax: std::f64::consts::SQRT_2 * cu,
        }
    }
}

impl GammaMapFilter {
    /// `enl` is ignored when `estimate_enl` is set; the ENL is then measured
    /// over each output tile.
    pub fn new(filter_size_x: usize, filter_size_y: usize, estimate_enl: bool, enl: f64) -> SarResult<Self> {
        validate_window_size("Gamma Map", filter_size_x, filter_size_y)?;
        if !estimate_enl {
            validate_enl(enl)?;
        }
        log::debug!(
            "Gamma Map filter {}x{}, ENL {}",
            filter_size_x,
            filter_size_y,
            if estimate_enl { "estimated per tile".to_string() } else { enl.to_string() }
        );
        Ok(Self {
            filter_size_x,
            filter_size_y,
            estimate_enl,
            enl,
        })
    }

    fn gamma_map_value(model: &SpeckleModel, neighborhood: &Neighborhood) -> f64 {
        let mean = neighborhood.mean();
        if mean <= DOUBLE_MIN {
            return mean;
        }

        let var = neighborhood.variance(mean);
        if var <= DOUBLE_MIN {
            return mean;
        }

        let ci = var.sqrt() / mean;
        if ci <= model.cu {
            return mean;
        }

        let cp = neighborhood.center();
        if ci < model.cmax {
            let alpha = (1.0 + model.cu2) / (ci * ci - model.cu2);
            let b = alpha - model.enl - 1.0;
            let d = mean * mean * b * b + 4.0 * alpha * model.enl * mean * cp;
            return (b * mean + d.sqrt()) / (2.0 * alpha);
        }

        cp
    }
}

impl SpeckleFilter for GammaMapFilter {
    fn name(&self) -> &'static str {
        "Gamma Map"
    }

    fn half_window(&self) -> (usize, usize) {
        (self.filter_size_x / 2, self.filter_size_y / 2)
    }

    fn perform_filtering(&self, source: &SourceTile, target: &Rectangle) -> SarResult<SarRealImage> {
        validate_tile(source, target, self.name())?;

        let enl = if self.estimate_enl {
            let enl = estimate_enl(source, target);
            log::debug!("Estimated ENL {:.3} over tile {}", enl, target);
            enl
        } else {
            self.enl
        };
        let model = SpeckleModel::new(enl);

        let (half_x, half_y) = self.half_window();
        Ok(map_windows(source, target, half_x, half_y, |nb| {
            Self::gamma_map_value(&model, nb)
        }))
    }
}
