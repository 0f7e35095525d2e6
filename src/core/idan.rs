//! Intensity-Driven Adaptive-Neighborhood (IDAN) filter (Vasile et al. 2006)
//!
//! Each pixel gets its own neighborhood grown from a robust seed: a
//! breadth-first region growing under a tight threshold, a second look at
//! the rejected pixels under a looser one, then MMSE over whatever was
//! collected.

use crate::core::neighborhood::mmse_weight;
use crate::core::speckle_filter::{validate_tile, SpeckleFilter};
use crate::core::tile::{is_no_data, SourceTile};
use crate::types::{BandUnit, Rectangle, SarError, SarRealImage, SarResult};
use ndarray::Array2;

/// 8-connected neighbour offsets in row-major order
const NEIGHBOUR_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[derive(Debug, Clone)]
pub struct IdanFilter {
    an_size: usize,
    num_looks: usize,
    sigma_v: f64,
}

impl IdanFilter {
    pub fn new(an_size: usize, num_looks: usize) -> SarResult<Self> {
        if an_size == 0 {
            return Err(SarError::InvalidParameter(
                "IDAN adaptive neighborhood size must be at least 1".to_string(),
            ));
        }
        if num_looks == 0 {
            return Err(SarError::InvalidParameter(
                "IDAN number of looks must be at least 1".to_string(),
            ));
        }
        log::debug!("IDAN filter: AN size {}, {} look(s)", an_size, num_looks);
        Ok(Self {
            an_size,
            num_looks,
            sigma_v: 1.0 / (num_looks as f64).sqrt(),
        })
    }

    pub fn from_strings(an_size: usize, num_looks: &str) -> SarResult<Self> {
        let looks = num_looks.trim().parse::<usize>().map_err(|_| {
            SarError::InvalidParameter(format!("Number of looks must be an integer, got '{}'", num_looks))
        })?;
        Self::new(an_size, looks)
    }

    pub fn an_size(&self) -> usize {
        self.an_size
    }

    pub fn num_looks(&self) -> usize {
        self.num_looks
    }

    /// Adaptive neighborhood of `(x, y)` as raster coordinates, center first
    /// when it qualifies. Never empty for a valid center; empty when the
    /// center is no-data or outside the tile.
    pub fn adaptive_neighborhood(&self, source: &SourceTile, x: usize, y: usize) -> Vec<(usize, usize)> {
        if is_no_data(source.intensity(x as i64, y as i64), source.no_data_value()) {
            return Vec::new();
        }
        let mut arena = GrowthArena::new(self.an_size);
        self.grow(source, x, y, &mut arena);
        arena.members.clone()
    }

    /// Grow the adaptive neighborhood of `(xc, yc)` into `arena.members`
    fn grow(&self, source: &SourceTile, xc: usize, yc: usize, arena: &mut GrowthArena) {
        arena.reset(xc, yc);

        let Some(seed) = initial_seed(source, xc, yc) else {
            arena.members.push((xc, yc));
            return;
        };
        let tight = 2.0 / 3.0 * self.sigma_v;
        let loose = 2.0 * self.sigma_v;

        // pass 1: breadth-first growth from accepted pixels only
        let center_value = source.intensity(xc as i64, yc as i64);
        arena.visit(xc as i64, yc as i64);
        if matches_seed(center_value, seed, tight) {
            arena.members.push((xc, yc));
            arena.frontier.push((xc, yc));
        } else {
            arena.background.push((xc, yc));
        }

        let nd = source.no_data_value();
        'growth: while arena.members.len() < self.an_size && !arena.frontier.is_empty() {
            arena.next_frontier.clear();
            for i in 0..arena.frontier.len() {
                let (px, py) = arena.frontier[i];
                for (dx, dy) in NEIGHBOUR_OFFSETS {
                    let nx = px as i64 + dx;
                    let ny = py as i64 + dy;
                    if !source.rect().contains(nx, ny) || !arena.visit(nx, ny) {
                        continue;
                    }
                    let v = source.intensity(nx, ny);
                    if is_no_data(v, nd) {
                        continue;
                    }
                    let pos = (nx as usize, ny as usize);
                    if matches_seed(v, seed, tight) {
                        arena.members.push(pos);
                        arena.next_frontier.push(pos);
                        if arena.members.len() == self.an_size {
                            break 'growth;
                        }
                    } else {
                        arena.background.push(pos);
                    }
                }
            }
            std::mem::swap(&mut arena.frontier, &mut arena.next_frontier);
        }

        // pass 2: re-examine rejected pixels against the neighborhood mean
        let refined_seed = if arena.members.is_empty() {
            seed
        } else {
            arena
                .members
                .iter()
                .map(|&(x, y)| source.intensity(x as i64, y as i64))
                .sum::<f64>()
                / arena.members.len() as f64
        };
        for i in 0..arena.background.len() {
            let (bx, by) = arena.background[i];
            if matches_seed(source.intensity(bx as i64, by as i64), refined_seed, loose) {
                arena.members.push((bx, by));
            }
        }

        if arena.members.is_empty() {
            arena.members.push((xc, yc));
        }
    }
}

/// Marginal median of the valid intensities in the 3x3 window (`sorted[k / 2]`),
/// `None` when the window holds no valid sample
fn initial_seed(source: &SourceTile, xc: usize, yc: usize) -> Option<f64> {
    let nd = source.no_data_value();
    let mut values = [0.0; 9];
    let mut k = 0;
    for y in yc as i64 - 1..=yc as i64 + 1 {
        for x in xc as i64 - 1..=xc as i64 + 1 {
            let v = source.intensity(x, y);
            if !is_no_data(v, nd) {
                values[k] = v;
                k += 1;
            }
        }
    }
    if k == 0 {
        return None;
    }
    let valid = &mut values[..k];
    valid.sort_by(|a, b| a.total_cmp(b));
    Some(valid[k / 2])
}

/// Relative distance test `|v - seed| / |seed| < threshold`; a zero seed matches nothing
fn matches_seed(value: f64, seed: f64, threshold: f64) -> bool {
    if seed == 0.0 {
        return false;
    }
    (value - seed).abs() / seed.abs() < threshold
}

/// Reusable scratch space for region growing: a generation-stamped visited
/// grid over the `(2r+1)^2` window reachable from the center, plus the
/// member, background and frontier lists.
#[derive(Debug)]
struct GrowthArena {
    radius: i64,
    side: usize,
    stamps: Vec<u32>,
    generation: u32,
    center: (i64, i64),
    members: Vec<(usize, usize)>,
    background: Vec<(usize, usize)>,
    frontier: Vec<(usize, usize)>,
    next_frontier: Vec<(usize, usize)>,
}

impl GrowthArena {
    fn new(radius: usize) -> Self {
        let side = 2 * radius + 1;
        Self {
            radius: radius as i64,
            side,
            stamps: vec![0; side * side],
            generation: 0,
            center: (0, 0),
            members: Vec::with_capacity(radius),
            background: Vec::with_capacity(radius),
            frontier: Vec::with_capacity(radius),
            next_frontier: Vec::with_capacity(radius),
        }
    }

    fn reset(&mut self, xc: usize, yc: usize) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.stamps.fill(0);
            self.generation = 1;
        }
        self.center = (xc as i64, yc as i64);
        self.members.clear();
        self.background.clear();
        self.frontier.clear();
        self.next_frontier.clear();
    }

    /// Mark `(x, y)` visited; false if it was already visited or lies outside the window
    fn visit(&mut self, x: i64, y: i64) -> bool {
        let dx = x - self.center.0 + self.radius;
        let dy = y - self.center.1 + self.radius;
        let side = self.side as i64;
        if dx < 0 || dy < 0 || dx >= side || dy >= side {
            return false;
        }
        let idx = dy as usize * self.side + dx as usize;
        if self.stamps[idx] == self.generation {
            return false;
        }
        self.stamps[idx] = self.generation;
        true
    }
}

impl SpeckleFilter for IdanFilter {
    fn name(&self) -> &'static str {
        "IDAN"
    }

    fn half_window(&self) -> (usize, usize) {
        (self.an_size, self.an_size)
    }

    fn perform_filtering(&self, source: &SourceTile, target: &Rectangle) -> SarResult<SarRealImage> {
        validate_tile(source, target, self.name())?;

        let nd = source.no_data_value();
        let sigma_v_sqr = self.sigma_v * self.sigma_v;
        let amplitude = source.unit() == BandUnit::Amplitude;

        let mut arena = GrowthArena::new(self.an_size);
        let mut intensities = Vec::with_capacity(self.an_size * 2);
        let mut output = Array2::from_elem((target.height, target.width), nd);

        for (r, y) in (target.y..target.max_y()).enumerate() {
            for (c, x) in (target.x..target.max_x()).enumerate() {
                let center = source.intensity(x as i64, y as i64);
                if is_no_data(center, nd) {
                    continue;
                }

                self.grow(source, x, y, &mut arena);
                intensities.clear();
                intensities.extend(
                    arena
                        .members
                        .iter()
                        .map(|&(mx, my)| source.intensity(mx as i64, my as i64)),
                );
                let b = mmse_weight(&intensities, nd, sigma_v_sqr);

                output[[r, c]] = if amplitude {
                    let mean = intensities.iter().map(|v| v.sqrt()).sum::<f64>() / intensities.len() as f64;
                    mean + b * (center.sqrt() - mean)
                } else {
                    let mean = intensities.iter().sum::<f64>() / intensities.len() as f64;
                    source.encode(mean + b * (center - mean))
                };
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tile(data: Array2<f64>, unit: BandUnit) -> SourceTile {
        let (rows, cols) = data.dim();
        SourceTile::new(Rectangle::new(0, 0, cols, rows), data, unit, 0.0).unwrap()
    }

    #[test]
    fn test_seed_is_marginal_median() {
        let data = Array2::from_shape_vec((3, 3), vec![9.0, 1.0, 8.0, 2.0, 7.0, 3.0, 6.0, 4.0, 5.0]).unwrap();
        let source = tile(data, BandUnit::Intensity);
        assert_eq!(initial_seed(&source, 1, 1), Some(5.0));
        // corner: valid values 9, 1, 2, 7 -> sorted[2]
        assert_eq!(initial_seed(&source, 0, 0), Some(7.0));
    }

    #[test]
    fn test_no_data_center_has_empty_neighborhood() {
        let source = tile(Array2::from_elem((5, 5), 0.0), BandUnit::Intensity);
        let filter = IdanFilter::new(50, 1).unwrap();
        assert_eq!(initial_seed(&source, 2, 2), None);
        assert!(filter.adaptive_neighborhood(&source, 2, 2).is_empty());

        let out = filter.perform_filtering(&source, &Rectangle::new(0, 0, 5, 5)).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_center_outside_tile_has_empty_neighborhood() {
        let source = tile(Array2::from_elem((5, 5), 10.0), BandUnit::Intensity);
        let filter = IdanFilter::new(50, 1).unwrap();
        assert!(filter.adaptive_neighborhood(&source, 9, 2).is_empty());
        assert!(filter.adaptive_neighborhood(&source, 2, 40).is_empty());
    }

    #[test]
    fn test_zero_seed_matches_nothing() {
        assert!(!matches_seed(0.0, 0.0, 1.0));
        assert!(matches_seed(1.1, 1.0, 0.5));
        assert!(!matches_seed(2.0, 1.0, 0.5));
    }

    #[test]
    fn test_growth_stops_at_an_size() {
        let filter = IdanFilter::new(12, 1).unwrap();
        let source = tile(Array2::from_elem((20, 20), 4.0), BandUnit::Intensity);
        let an = filter.adaptive_neighborhood(&source, 10, 10);
        assert_eq!(an.len(), 12);
        assert_eq!(an[0], (10, 10));
        // first ring in row-major order
        assert_eq!(an[1], (9, 9));
        assert_eq!(an[8], (11, 11));
    }

    #[test]
    fn test_isolated_spike_has_single_pixel_neighborhood() {
        let mut data = Array2::from_elem((11, 11), 100.0);
        data[[5, 5]] = 1000.0;
        let source = tile(data, BandUnit::Intensity);
        let filter = IdanFilter::new(50, 1).unwrap();

        assert_eq!(filter.adaptive_neighborhood(&source, 5, 5), vec![(5, 5)]);

        let out = filter.perform_filtering(&source, &Rectangle::new(0, 0, 11, 11)).unwrap();
        assert_eq!(out[[5, 5]], 1000.0);
        assert_relative_eq!(out[[5, 4]], 100.0);
        assert_relative_eq!(out[[0, 0]], 100.0);
    }

    #[test]
    fn test_background_pixels_rejoin_in_second_pass() {
        // 120 is outside the tight threshold of a 100 seed but inside the loose one
        let mut data = Array2::from_elem((7, 7), 100.0);
        data[[3, 4]] = 120.0;
        let source = tile(data, BandUnit::Intensity);
        let filter = IdanFilter::new(60, 16).unwrap();
        let an = filter.adaptive_neighborhood(&source, 3, 3);
        assert!(an.contains(&(4, 3)));
        assert_eq!(an.len(), 49);
    }

    #[test]
    fn test_amplitude_output_in_amplitude_domain() {
        let source = tile(Array2::from_elem((6, 6), 3.0), BandUnit::Amplitude);
        let filter = IdanFilter::new(20, 1).unwrap();
        let out = filter.perform_filtering(&source, &Rectangle::new(0, 0, 6, 6)).unwrap();
        assert!(out.iter().all(|&v| (v - 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_no_data_is_never_grown_into() {
        let mut data = Array2::from_elem((5, 5), 10.0);
        data[[2, 3]] = 0.0;
        let source = tile(data, BandUnit::Intensity);
        let filter = IdanFilter::new(50, 1).unwrap();
        let an = filter.adaptive_neighborhood(&source, 2, 2);
        assert!(!an.contains(&(3, 2)));
        assert_eq!(an.len(), 24);

        let out = filter.perform_filtering(&source, &Rectangle::new(0, 0, 5, 5)).unwrap();
        assert_eq!(out[[2, 3]], 0.0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(IdanFilter::new(0, 1).is_err());
        assert!(IdanFilter::from_strings(50, "0").is_err());
        assert!(IdanFilter::from_strings(50, "x").is_err());
        assert_eq!(IdanFilter::from_strings(50, " 4 ").unwrap().num_looks(), 4);
    }
}
