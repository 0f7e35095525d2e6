//! Window extraction and the local statistics shared by every speckle filter.
//!
//! All functions here are stateless; filters compose them rather than
//! inheriting them.

use crate::core::tile::{is_no_data, SampleDomain, SourceTile};
use crate::types::{Rectangle, SarRealImage};
use ndarray::Array2;

/// Smallest positive double; variances and means at or below it are treated as zero
pub const DOUBLE_MIN: f64 = 4.9e-324;

/// Expand the output rectangle by the half-window on every side, then clamp
/// to `[0, image_width) x [0, image_height)`.
///
/// Pixels near the raster edge therefore see a smaller neighborhood; the
/// source is never padded or reflected.
#[allow(clippy::too_many_arguments)]
pub fn source_region(
    x0: usize,
    y0: usize,
    w: usize,
    h: usize,
    half_x: usize,
    half_y: usize,
    image_width: usize,
    image_height: usize,
) -> Rectangle {
    let sx0 = x0.saturating_sub(half_x);
    let sy0 = y0.saturating_sub(half_y);
    let sx1 = (x0 + w + half_x).min(image_width);
    let sy1 = (y0 + h + half_y).min(image_height);
    Rectangle {
        x: sx0,
        y: sy0,
        width: sx1.saturating_sub(sx0),
        height: sy1.saturating_sub(sy0),
    }
}

/// Samples of a rectangular window, row-major, with invalid positions holding
/// the no-data value. Callers skip those during reduction.
#[derive(Debug, Clone)]
pub struct Neighborhood {
    values: Vec<f64>,
    valid_count: usize,
    width: usize,
    height: usize,
    no_data_value: f64,
}

impl Neighborhood {
    /// Empty buffer for a `(2*half_x+1) x (2*half_y+1)` window
    pub fn with_window(half_x: usize, half_y: usize, no_data_value: f64) -> Self {
        let width = 2 * half_x + 1;
        let height = 2 * half_y + 1;
        Self {
            values: vec![no_data_value; width * height],
            valid_count: 0,
            width,
            height,
            no_data_value,
        }
    }

    /// Refill the window centred on `(x, y)` from `tile`
    pub fn fill(&mut self, tile: &SourceTile, x: usize, y: usize, domain: SampleDomain) {
        let half_x = (self.width / 2) as i64;
        let half_y = (self.height / 2) as i64;
        let (xc, yc) = (x as i64, y as i64);

        self.no_data_value = tile.no_data_value();
        self.valid_count = 0;
        let mut k = 0;
        for yy in (yc - half_y)..=(yc + half_y) {
            for xx in (xc - half_x)..=(xc + half_x) {
                let v = tile.sample(xx, yy, domain);
                if !is_no_data(v, self.no_data_value) {
                    self.valid_count += 1;
                }
                self.values[k] = v;
                k += 1;
            }
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn valid_count(&self) -> usize {
        self.valid_count
    }

    /// Every position in the window holds a valid sample
    pub fn is_full(&self) -> bool {
        self.valid_count == self.values.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn no_data_value(&self) -> f64 {
        self.no_data_value
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.width + col]
    }

    pub fn center(&self) -> f64 {
        self.get(self.height / 2, self.width / 2)
    }

    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        !is_no_data(self.get(row, col), self.no_data_value)
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        let nd = self.no_data_value;
        self.values.iter().copied().filter(move |&v| !is_no_data(v, nd))
    }

    pub fn mean(&self) -> f64 {
        mean(&self.values, self.valid_count, self.no_data_value)
    }

    pub fn variance(&self, mean: f64) -> f64 {
        variance(&self.values, mean, self.no_data_value)
    }
}

/// Collect the window around `(x, y)`, converting every sample to `domain`.
///
/// Complex pairs become `I^2 + Q^2`; with [`SampleDomain::Intensity`] amplitude
/// samples are squared; dB samples are delinearised. Positions outside the
/// tile or flagged no-data hold the no-data value and are not counted.
pub fn collect_neighborhood(
    tile: &SourceTile,
    x: usize,
    y: usize,
    half_x: usize,
    half_y: usize,
    domain: SampleDomain,
) -> Neighborhood {
    let mut neighborhood = Neighborhood::with_window(half_x, half_y, tile.no_data_value());
    neighborhood.fill(tile, x, y, domain);
    neighborhood
}

/// Run `estimator` over the window of every pixel of `target`, in intensity
/// domain, and encode the results back into the band unit.
///
/// Pixels whose center is no-data, or whose window has no valid sample, are
/// left at the no-data value without calling `estimator`.
pub fn map_windows<F>(
    source: &SourceTile,
    target: &Rectangle,
    half_x: usize,
    half_y: usize,
    mut estimator: F,
) -> SarRealImage
where
    F: FnMut(&Neighborhood) -> f64,
{
    let nd = source.no_data_value();
    let mut output = Array2::from_elem((target.height, target.width), nd);
    let mut neighborhood = Neighborhood::with_window(half_x, half_y, nd);

    for (r, y) in (target.y..target.max_y()).enumerate() {
        for (c, x) in (target.x..target.max_x()).enumerate() {
            neighborhood.fill(source, x, y, SampleDomain::Intensity);
            if neighborhood.valid_count() == 0 || is_no_data(neighborhood.center(), nd) {
                continue;
            }
            output[[r, c]] = source.encode(estimator(&neighborhood));
        }
    }
    output
}

pub fn count_valid(values: &[f64], no_data_value: f64) -> usize {
    values.iter().filter(|&&v| !is_no_data(v, no_data_value)).count()
}

/// Arithmetic mean of the non-sentinel entries.
///
/// `valid_count` must be the number of non-sentinel entries and must be
/// non-zero; callers guard the empty case.
pub fn mean(values: &[f64], valid_count: usize, no_data_value: f64) -> f64 {
    let sum: f64 = values
        .iter()
        .filter(|&&v| !is_no_data(v, no_data_value))
        .sum();
    sum / valid_count as f64
}

/// Unbiased (N-1) sample variance of the non-sentinel entries, 0 below two samples
pub fn variance(values: &[f64], mean: f64, no_data_value: f64) -> f64 {
    let mut n = 0usize;
    let mut acc = 0.0;
    for &v in values {
        if !is_no_data(v, no_data_value) {
            let diff = v - mean;
            acc += diff * diff;
            n += 1;
        }
    }
    if n < 2 {
        0.0
    } else {
        acc / (n - 1) as f64
    }
}

/// MMSE weight `b = max(0, (var_y - mean^2 * sigma_v^2) / (1 + sigma_v^2)) / var_y`,
/// in `[0, 1]`; 0 when the samples have no variance.
pub fn mmse_weight(values: &[f64], no_data_value: f64, sigma_v_sqr: f64) -> f64 {
    let n = count_valid(values, no_data_value);
    if n == 0 {
        return 0.0;
    }
    let mean_y = mean(values, n, no_data_value);
    let var_y = variance(values, mean_y, no_data_value);
    mmse_weight_from_stats(mean_y, var_y, sigma_v_sqr)
}

pub(crate) fn mmse_weight_from_stats(mean_y: f64, var_y: f64, sigma_v_sqr: f64) -> f64 {
    if var_y == 0.0 {
        return 0.0;
    }
    let var_x = ((var_y - mean_y * mean_y * sigma_v_sqr) / (1.0 + sigma_v_sqr)).max(0.0);
    (var_x / var_y).clamp(0.0, 1.0)
}

/// MMSE blend of `center` toward the mean of `values`: `(1 - b) * mean + b * center`.
///
/// Returns the no-data value when `values` holds no valid sample.
pub fn mmse_estimate(center: f64, values: &[f64], no_data_value: f64, sigma_v_sqr: f64) -> f64 {
    let n = count_valid(values, no_data_value);
    if n == 0 {
        return no_data_value;
    }
    let mean_y = mean(values, n, no_data_value);
    let var_y = variance(values, mean_y, no_data_value);
    let b = mmse_weight_from_stats(mean_y, var_y, sigma_v_sqr);
    (1.0 - b) * mean_y + b * center
}

/// Moment-based equivalent number of looks over `region` of the tile.
///
/// Intensity (and complex-derived intensity): `ENL = m^2 / (E[x^2] - m^2)`.
/// Amplitude: the same ratio built from the 2nd and 4th moments of the
/// amplitude, i.e. `E[a^2]^2 / (E[a^4] - E[a^2]^2)`.
/// Falls back to 1.0 when there is no usable variance.
pub fn estimate_enl(tile: &SourceTile, region: &Rectangle) -> f64 {
    let nd = tile.no_data_value();
    let mut sum = 0.0;
    let mut sum2 = 0.0;
    let mut n = 0usize;

    for y in region.y..region.max_y() {
        for x in region.x..region.max_x() {
            // amplitude is squared here, so sum/sum2 are the 2nd/4th amplitude moments
            let v = tile.intensity(x as i64, y as i64);
            if !is_no_data(v, nd) {
                sum += v;
                sum2 += v * v;
                n += 1;
            }
        }
    }

    if n == 0 || sum == 0.0 || sum2 <= 0.0 {
        log::warn!("ENL estimation over {} found no usable samples, using 1.0", region);
        return 1.0;
    }

    let m = sum / n as f64;
    let m2 = sum2 / n as f64;
    let mm = m * m;
    let denom = m2 - mm;
    if denom <= DOUBLE_MIN {
        log::warn!("ENL estimation over {} found no variance, using 1.0", region);
        return 1.0;
    }

    let enl = mm / denom;
    if enl.is_finite() && enl > 0.0 {
        enl
    } else {
        1.0
    }
}
