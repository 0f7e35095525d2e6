use crate::core::neighborhood::{map_windows, mean, mmse_weight_from_stats, variance, Neighborhood};
use crate::core::speckle_filter::{validate_tile, SpeckleFilter};
use crate::core::tile::SourceTile;
use crate::types::{Rectangle, SarRealImage, SarResult};

/// Window edge length; the filter is defined only for 7x7
pub const REFINED_LEE_WINDOW: usize = 7;

const HALF: usize = REFINED_LEE_WINDOW / 2;
const NON_EDGE_PIXELS: usize = 28;

/// Refined Lee filter (Lee 1981): edge-aligned MMSE over one of eight
/// half-windows chosen from 3x3 sub-area gradients.
#[derive(Debug, Clone, Default)]
pub struct RefinedLeeFilter;

impl RefinedLeeFilter {
    pub fn new() -> Self {
        Self
    }

    fn refined_lee_value(neighborhood: &Neighborhood) -> f64 {
        if !neighborhood.is_full() {
            return local_statistics_value(neighborhood);
        }

        let sub_means = sub_area_means(neighborhood);
        let d = edge_direction(&sub_means);

        let mut pixels = [0.0; NON_EDGE_PIXELS];
        let mut k = 0;
        for y in 0..REFINED_LEE_WINDOW {
            for x in 0..REFINED_LEE_WINDOW {
                if in_non_edge_region(d, y, x) {
                    pixels[k] = neighborhood.get(y, x);
                    k += 1;
                }
            }
        }

        let nd = neighborhood.no_data_value();
        let mean_y = mean(&pixels, NON_EDGE_PIXELS, nd);
        let var_y = variance(&pixels, mean_y, nd);
        if var_y == 0.0 {
            return mean_y;
        }

        let noise_var = local_noise_variance(neighborhood);
        let b = mmse_weight_from_stats(mean_y, var_y, noise_var);
        mean_y + b * (neighborhood.center() - mean_y)
    }
}

impl SpeckleFilter for RefinedLeeFilter {
    fn name(&self) -> &'static str {
        "Refined Lee"
    }

    fn half_window(&self) -> (usize, usize) {
        (HALF, HALF)
    }

    fn perform_filtering(&self, source: &SourceTile, target: &Rectangle) -> SarResult<SarRealImage> {
        validate_tile(source, target, self.name())?;
        Ok(map_windows(source, target, HALF, HALF, Self::refined_lee_value))
    }
}

/// Plain local-statistics MMSE over whatever samples are valid, used when the
/// window is clipped by the raster edge or holds no-data.
fn local_statistics_value(neighborhood: &Neighborhood) -> f64 {
    let mean_y = neighborhood.mean();
    let var_y = neighborhood.variance(mean_y);
    if var_y == 0.0 {
        return mean_y;
    }

    let noise_var = local_noise_variance(neighborhood);
    let b = mmse_weight_from_stats(mean_y, var_y, noise_var);
    mean_y + b * (neighborhood.center() - mean_y)
}

/// Means of the nine overlapping 3x3 sub-areas at offsets 0, 2 and 4
fn sub_area_means(neighborhood: &Neighborhood) -> [[f64; 3]; 3] {
    let mut means = [[0.0; 3]; 3];
    for (j, row) in means.iter_mut().enumerate() {
        for (i, m) in row.iter_mut().enumerate() {
            let mut sum = 0.0;
            for y in 2 * j..2 * j + 3 {
                for x in 2 * i..2 * i + 3 {
                    sum += neighborhood.get(y, x);
                }
            }
            *m = sum / 9.0;
        }
    }
    means
}

/// Pick one of the eight edge orientations.
///
/// The strongest of the horizontal, anti-diagonal, vertical and diagonal
/// gradients selects the axis; the side of the center closer to the center
/// sub-mean selects which half-window is homogeneous.
fn edge_direction(m: &[[f64; 3]; 3]) -> usize {
    let gradients = [
        (m[1][0] - m[1][2]).abs(),
        (m[0][2] - m[2][0]).abs(),
        (m[0][1] - m[2][1]).abs(),
        (m[0][0] - m[2][2]).abs(),
    ];

    let mut direction = 0;
    let mut max_gradient = f64::MIN;
    for (i, &g) in gradients.iter().enumerate() {
        if max_gradient < g {
            max_gradient = g;
            direction = i;
        }
    }

    let c = m[1][1];
    match direction {
        0 => {
            if (m[1][0] - c).abs() < (c - m[1][2]).abs() {
                4
            } else {
                0
            }
        }
        1 => {
            if (m[0][2] - c).abs() < (c - m[2][0]).abs() {
                1
            } else {
                5
            }
        }
        2 => {
            if (m[0][1] - c).abs() < (c - m[2][1]).abs() {
                2
            } else {
                6
            }
        }
        _ => {
            if (m[0][0] - c).abs() < (c - m[2][2]).abs() {
                3
            } else {
                7
            }
        }
    }
}

/// Membership of window position (row `y`, column `x`) in the 28-pixel
/// non-edge region of orientation `d`
fn in_non_edge_region(d: usize, y: usize, x: usize) -> bool {
    let n = REFINED_LEE_WINDOW;
    match d {
        0 => x >= HALF,
        1 => x >= y,
        2 => y <= HALF,
        3 => x < n - y,
        4 => x <= HALF,
        5 => x <= y,
        6 => y >= HALF,
        _ => x + 1 >= n - y,
    }
}

/// Speckle noise variance estimated from the flattest sub-areas: the mean of
/// the lowest (up to) five squared coefficients of variation among the fully
/// valid 3x3 sub-areas.
fn local_noise_variance(neighborhood: &Neighborhood) -> f64 {
    let nd = neighborhood.no_data_value();
    let mut cv2 = Vec::with_capacity(9);
    let mut sub_area = [0.0; 9];

    for j in 0..3 {
        for i in 0..3 {
            let mut k = 0;
            for y in 2 * j..2 * j + 3 {
                for x in 2 * i..2 * i + 3 {
                    if neighborhood.is_valid(y, x) {
                        sub_area[k] = neighborhood.get(y, x);
                        k += 1;
                    }
                }
            }
            if k < 9 {
                continue;
            }

            let m = mean(&sub_area, 9, nd);
            if m > 0.0 {
                cv2.push(variance(&sub_area, m, nd) / (m * m));
            } else {
                cv2.push(0.0);
            }
        }
    }

    if cv2.is_empty() {
        return 0.0;
    }
    cv2.sort_by(|a, b| a.total_cmp(b));
    let n = cv2.len().min(5);
    cv2[..n].iter().sum::<f64>() / n as f64
}
