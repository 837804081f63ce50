//! Pressure field reconstruction
//!
//! Turns sparse channel readings into a renderable field over the foot layout:
//!
//! 1. seed a grid shaped like the layout; bound cells take their channel's
//!    reading, everything else (including bound cells whose channel is absent
//!    from the message) is 0
//! 2. blur the whole grid with a separable Gaussian
//! 3. mask every cell without a sensor
//! 4. clip the resampled field to the foot outline
//! 5. place a marker on every bound cell
//!
//! Blurring happens before masking: sensed values bleed into neighbouring
//! unassigned cells, and the mask then hides that bleed. An absent channel is
//! indistinguishable from a zero reading here.

use crate::error::PlantarError;
use crate::layout::{FootLayout, FootOutline};
use crate::types::ChannelMap;
use serde::{Deserialize, Serialize};

/// Reference smoothing sigma in grid units
pub const DEFAULT_SIGMA: f64 = 1.5;

/// Kernel half-width in sigmas
pub const DEFAULT_TRUNCATE: f64 = 4.0;

/// Raster samples per grid unit
pub const DEFAULT_RASTER_RESOLUTION: usize = 8;

/// Widest accepted kernel half-width (`truncate * sigma`) in grid units.
/// Reflecting edges make a kernel this wide already flat over any layout.
pub const MAX_KERNEL_RADIUS: usize = 64;

/// Reconstruction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub sigma: f64,
    pub truncate: f64,
    pub raster_resolution: usize,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_SIGMA,
            truncate: DEFAULT_TRUNCATE,
            raster_resolution: DEFAULT_RASTER_RESOLUTION,
        }
    }
}

impl ReconstructionConfig {
    pub fn with_sigma(sigma: f64) -> Self {
        Self {
            sigma,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), PlantarError> {
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(PlantarError::InvalidConfig(format!(
                "sigma must be finite and non-negative, got {}",
                self.sigma
            )));
        }
        if !self.truncate.is_finite() || self.truncate <= 0.0 {
            return Err(PlantarError::InvalidConfig(format!(
                "truncate must be finite and positive, got {}",
                self.truncate
            )));
        }
        if self.truncate * self.sigma > MAX_KERNEL_RADIUS as f64 {
            return Err(PlantarError::InvalidConfig(format!(
                "truncate * sigma must be at most {MAX_KERNEL_RADIUS}, got {}",
                self.truncate * self.sigma
            )));
        }
        if self.raster_resolution == 0 {
            return Err(PlantarError::InvalidConfig(
                "raster_resolution must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Normalized 1-D Gaussian weights, `2 * radius + 1` long.
///
/// The radius is capped at [`MAX_KERNEL_RADIUS`].
pub fn gaussian_kernel(sigma: f64, truncate: f64) -> Vec<f64> {
    let radius = (truncate * sigma + 0.5).min(MAX_KERNEL_RADIUS as f64) as usize;
    let weights: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let d = i as f64 - radius as f64;
            (-0.5 * (d / sigma) * (d / sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Mirror an out-of-range index back into `0..n` (edge sample repeated)
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Gaussian blur of a row-major grid with reflecting boundaries.
///
/// Filters down the columns first, then along the rows.
pub fn gaussian_filter(values: &[f64], rows: usize, cols: usize, sigma: f64, truncate: f64) -> Vec<f64> {
    if sigma == 0.0 || values.is_empty() {
        return values.to_vec();
    }
    let kernel = gaussian_kernel(sigma, truncate);
    let radius = (kernel.len() / 2) as isize;

    let mut vertical = vec![0.0; values.len()];
    for col in 0..cols {
        for row in 0..rows {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let r = reflect_index(row as isize + k as isize - radius, rows);
                acc += w * values[r * cols + col];
            }
            vertical[row * cols + col] = acc;
        }
    }

    let mut out = vec![0.0; values.len()];
    for row in 0..rows {
        for col in 0..cols {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let c = reflect_index(col as isize + k as isize - radius, cols);
                acc += w * vertical[row * cols + c];
            }
            out[row * cols + col] = acc;
        }
    }
    out
}

/// Smoothed grid plus display mask; one instance per render cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureField {
    pub rows: usize,
    pub cols: usize,
    /// Row-major values after smoothing, before masking
    pub smoothed: Vec<f64>,
    /// Row-major, `true` = excluded from display
    pub mask: Vec<bool>,
}

impl PressureField {
    fn index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows && col < self.cols).then(|| row * self.cols + col)
    }

    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        self.index(row, col).map_or(true, |i| self.mask[i])
    }

    /// Smoothed value regardless of the mask
    pub fn smoothed_at(&self, row: usize, col: usize) -> Option<f64> {
        self.index(row, col).map(|i| self.smoothed[i])
    }

    /// Value shown to the viewer; `None` for masked cells
    pub fn displayed(&self, row: usize, col: usize) -> Option<f64> {
        self.index(row, col)
            .filter(|&i| !self.mask[i])
            .map(|i| self.smoothed[i])
    }

    /// Displayed values as nested rows
    pub fn displayed_rows(&self) -> Vec<Vec<Option<f64>>> {
        (0..self.rows)
            .map(|row| (0..self.cols).map(|col| self.displayed(row, col)).collect())
            .collect()
    }

    /// Largest displayed value
    pub fn max_displayed(&self) -> Option<f64> {
        self.smoothed
            .iter()
            .zip(&self.mask)
            .filter(|(_, masked)| !**masked)
            .map(|(v, _)| *v)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
    }

    /// Displayed cells strictly above every displayed 4-neighbour
    pub fn local_maxima(&self) -> Vec<(usize, usize)> {
        let mut peaks = Vec::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                let Some(v) = self.displayed(row, col) else {
                    continue;
                };
                let neighbours = [
                    row.checked_sub(1).map(|r| (r, col)),
                    Some((row + 1, col)),
                    col.checked_sub(1).map(|c| (row, c)),
                    Some((row, col + 1)),
                ];
                let is_peak = neighbours
                    .iter()
                    .flatten()
                    .filter_map(|&(r, c)| self.displayed(r, c))
                    .all(|n| v > n);
                if is_peak {
                    peaks.push((row, col));
                }
            }
        }
        peaks
    }

    /// Bilinear sample at grid coordinates, using only fully unmasked quads
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        if self.rows < 2 || self.cols < 2 {
            return None;
        }
        let max_x = (self.cols - 1) as f64;
        let max_y = (self.rows - 1) as f64;
        if !(0.0..=max_x).contains(&x) || !(0.0..=max_y).contains(&y) {
            return None;
        }
        for r0 in quad_candidates(y, self.rows) {
            for c0 in quad_candidates(x, self.cols) {
                let corners = [(r0, c0), (r0, c0 + 1), (r0 + 1, c0), (r0 + 1, c0 + 1)];
                if corners.iter().any(|&(r, c)| self.is_masked(r, c)) {
                    continue;
                }
                let tx = x - c0 as f64;
                let ty = y - r0 as f64;
                let v = |r: usize, c: usize| self.smoothed[r * self.cols + c];
                let top = v(r0, c0) * (1.0 - tx) + v(r0, c0 + 1) * tx;
                let bottom = v(r0 + 1, c0) * (1.0 - tx) + v(r0 + 1, c0 + 1) * tx;
                return Some(top * (1.0 - ty) + bottom * ty);
            }
        }
        None
    }
}

/// Lower corner indices of the quads whose closed extent contains `t`
fn quad_candidates(t: f64, n: usize) -> Vec<usize> {
    let last = n - 2;
    let base = (t.floor() as usize).min(last);
    let mut out = vec![base];
    if base > 0 && base as f64 == t {
        out.push(base - 1);
    }
    out
}

/// Sensor position marker, drawn independently of the field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorMarker {
    pub channel: u8,
    pub row: usize,
    pub col: usize,
    pub x: f64,
    pub y: f64,
}

/// Field resampled on a finer lattice and clipped to the outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClippedRaster {
    pub width: usize,
    pub height: usize,
    /// Samples per grid unit
    pub resolution: usize,
    /// Row-major; `None` where nothing may be drawn
    pub pixels: Vec<Option<f64>>,
}

impl ClippedRaster {
    fn build(field: &PressureField, outline: &FootOutline, resolution: usize) -> Self {
        let width = (field.cols.saturating_sub(1)) * resolution + 1;
        let height = (field.rows.saturating_sub(1)) * resolution + 1;
        let (min_x, min_y, max_x, max_y) = outline.bounds();
        let mut pixels = Vec::with_capacity(width * height);
        for py in 0..height {
            for px in 0..width {
                let (x, y) = (px as f64 / resolution as f64, py as f64 / resolution as f64);
                let in_box = (min_x..=max_x).contains(&x) && (min_y..=max_y).contains(&y);
                let value = if in_box && outline.contains(x, y) {
                    field.sample(x, y)
                } else {
                    None
                };
                pixels.push(value);
            }
        }
        Self {
            width,
            height,
            resolution,
            pixels,
        }
    }

    pub fn get(&self, px: usize, py: usize) -> Option<f64> {
        if px < self.width && py < self.height {
            self.pixels[py * self.width + px]
        } else {
            None
        }
    }

    /// Grid coordinates of a pixel
    pub fn coords(&self, px: usize, py: usize) -> (f64, f64) {
        (
            px as f64 / self.resolution as f64,
            py as f64 / self.resolution as f64,
        )
    }

    pub fn drawn_pixels(&self) -> usize {
        self.pixels.iter().filter(|p| p.is_some()).count()
    }
}

/// Output of one reconstruction
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub field: PressureField,
    pub raster: ClippedRaster,
    pub markers: Vec<SensorMarker>,
}

/// Seed grid: channel readings at bound cells, 0 elsewhere
fn seed_grid(channels: &ChannelMap, layout: &FootLayout) -> Vec<f64> {
    let mut grid = vec![0.0; layout.rows() * layout.cols()];
    for (row, col, channel) in layout.bound_cells() {
        grid[row * layout.cols() + col] = channels.get(&channel).map_or(0.0, |&v| f64::from(v));
    }
    grid
}

/// Reconstruct a masked, clipped pressure field from one message's readings.
///
/// Pure: identical inputs give bit-identical output.
pub fn reconstruct(
    channels: &ChannelMap,
    layout: &FootLayout,
    outline: &FootOutline,
    config: &ReconstructionConfig,
) -> Reconstruction {
    let (rows, cols) = (layout.rows(), layout.cols());

    let grid = seed_grid(channels, layout);
    let smoothed = gaussian_filter(&grid, rows, cols, config.sigma, config.truncate);
    let field = PressureField {
        rows,
        cols,
        smoothed,
        mask: layout.unassigned_mask(),
    };

    let raster = ClippedRaster::build(&field, outline, config.raster_resolution.max(1));

    let markers = layout
        .bound_cells()
        .map(|(row, col, channel)| SensorMarker {
            channel,
            row,
            col,
            x: col as f64,
            y: row as f64,
        })
        .collect();

    Reconstruction {
        field,
        raster,
        markers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutCells;

    fn channels(pairs: &[(u8, u16)]) -> ChannelMap {
        pairs.iter().copied().collect()
    }

    fn default_reconstruct(map: &ChannelMap) -> Reconstruction {
        reconstruct(
            map,
            &FootLayout::default(),
            &FootOutline::default(),
            &ReconstructionConfig::default(),
        )
    }

    #[test]
    fn test_kernel_shape() {
        let kernel = gaussian_kernel(1.5, 4.0);
        assert_eq!(kernel.len(), 13);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(kernel[0], kernel[12]);
        assert!(kernel[6] > kernel[5]);
    }

    #[test]
    fn test_reflect_index() {
        let n = 4;
        let mapped: Vec<usize> = (-6..10).map(|i| reflect_index(i, n)).collect();
        assert_eq!(mapped, vec![2, 3, 3, 2, 1, 0, 0, 1, 2, 3, 3, 2, 1, 0, 0, 1]);
    }

    #[test]
    fn test_filter_preserves_constant_grid() {
        let grid = vec![7.0; 16];
        let out = gaussian_filter(&grid, 4, 4, 1.5, 4.0);
        assert!(out.iter().all(|v| (v - 7.0).abs() < 1e-9));
    }

    #[test]
    fn test_zero_sigma_is_identity() {
        let grid: Vec<f64> = (0..16).map(f64::from).collect();
        assert_eq!(gaussian_filter(&grid, 4, 4, 0.0, 4.0), grid);
    }

    #[test]
    fn test_reference_values() {
        let result = default_reconstruct(&channels(&[(0, 120), (5, 200)]));
        let field = &result.field;
        // Reference blur of the scenario grid (reflecting edges, sigma 1.5)
        assert!((field.smoothed_at(0, 0).unwrap() - 36.9683).abs() < 1e-3);
        assert!((field.smoothed_at(1, 1).unwrap() - 26.2989).abs() < 1e-3);
        assert!((field.smoothed_at(2, 1).unwrap() - 24.0261).abs() < 1e-3);
        assert!((field.smoothed_at(3, 3).unwrap() - 9.7704).abs() < 1e-3);
    }

    #[test]
    fn test_absent_bound_channel_reads_zero() {
        let layout = FootLayout::default();
        let grid = seed_grid(&channels(&[(4, 90)]), &layout);
        assert_eq!(grid[5], 90.0); // (1, 1)
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid.iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn test_reconstruction_is_pure() {
        let map = channels(&[(0, 12), (3, 250), (6, 77)]);
        let a = default_reconstruct(&map);
        let b = default_reconstruct(&map);
        assert_eq!(a, b);
        let bits = |r: &Reconstruction| -> Vec<u64> { r.field.smoothed.iter().map(|v| v.to_bits()).collect() };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn test_masked_cells_never_displayed() {
        // Deterministic sweep over many layouts
        let mut seed: u32 = 0x2545_F491;
        for _ in 0..64 {
            let mut cells: LayoutCells = [[None; 4]; 4];
            let mut next_channel = 0u8;
            for row in cells.iter_mut() {
                for cell in row.iter_mut() {
                    seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    if seed >> 30 == 0 && next_channel < 8 {
                        *cell = Some(next_channel);
                        next_channel += 1;
                    }
                }
            }
            let layout = FootLayout::new(cells).unwrap();
            let map: ChannelMap = (0..8).map(|c| (c, 100 + u16::from(c))).collect();
            let result = reconstruct(&map, &layout, &FootOutline::default(), &ReconstructionConfig::default());
            for row in 0..4 {
                for col in 0..4 {
                    let masked = layout.channel_at(row, col).is_none();
                    assert_eq!(result.field.is_masked(row, col), masked);
                    if masked {
                        assert_eq!(result.field.displayed(row, col), None);
                        assert_eq!(result.field.displayed_rows()[row][col], None);
                    }
                }
            }
        }
    }

    #[test]
    fn test_blur_then_mask_hides_bleed() {
        let mut cells: LayoutCells = [[None; 4]; 4];
        cells[1][0] = Some(1);
        cells[1][1] = Some(0);
        cells[2][1] = Some(2);
        let layout = FootLayout::new(cells).unwrap();
        let result = reconstruct(
            &channels(&[(0, 255)]),
            &layout,
            &FootOutline::default(),
            &ReconstructionConfig::default(),
        );
        let field = &result.field;

        // (0, 1) and (1, 2) are unassigned neighbours of the sensed cell
        for (row, col) in [(0, 1), (1, 2)] {
            assert!(field.smoothed_at(row, col).unwrap() > 0.0);
            assert_eq!(field.displayed(row, col), None);
        }
        assert!(field.displayed(1, 1).unwrap() > 0.0);
    }

    #[test]
    fn test_scenario_peaks() {
        let map = channels(&[(0, 120), (5, 200)]);
        let layout = FootLayout::default();
        let ch0 = layout.position_of(0).unwrap();
        let ch5 = layout.position_of(5).unwrap();

        let tight = reconstruct(&map, &layout, &FootOutline::default(), &ReconstructionConfig::with_sigma(1.0));
        assert_eq!(tight.field.local_maxima(), vec![ch0, ch5]);

        // At the reference sigma the kernel spans the whole grid and only the
        // toe cell stays a strict peak
        let reference = default_reconstruct(&map);
        assert_eq!(reference.field.local_maxima(), vec![ch0]);
        assert_eq!(reference.field.max_displayed(), reference.field.displayed(ch0.0, ch0.1));
    }

    #[test]
    fn test_raster_is_clipped_to_outline() {
        let result = default_reconstruct(&channels(&[(3, 200), (6, 150)]));
        let raster = &result.raster;
        let outline = FootOutline::default();
        assert_eq!((raster.width, raster.height), (25, 25));
        assert!(raster.drawn_pixels() > 0);
        for py in 0..raster.height {
            for px in 0..raster.width {
                let (x, y) = raster.coords(px, py);
                if raster.get(px, py).is_some() {
                    assert!(outline.contains(x, y), "drawn outside outline at ({x}, {y})");
                }
                if !outline.contains(x, y) {
                    assert_eq!(raster.get(px, py), None);
                }
            }
        }
        // Toe corner lies outside the outline
        assert_eq!(raster.get(0, 0), None);
    }

    #[test]
    fn test_raster_stays_inside_outline_bounds() {
        // Heel-only outline
        let outline = FootOutline::new(vec![[0.5, 2.0], [2.5, 2.0], [2.5, 3.0], [0.5, 3.0]]).unwrap();
        let result = reconstruct(
            &channels(&[(0, 120), (5, 200), (6, 150)]),
            &FootLayout::default(),
            &outline,
            &ReconstructionConfig::default(),
        );
        let raster = &result.raster;
        assert!(raster.drawn_pixels() > 0);
        for py in 0..raster.height {
            for px in 0..raster.width {
                let (x, y) = raster.coords(px, py);
                if !(0.5..=2.5).contains(&x) || !(2.0..=3.0).contains(&y) {
                    assert_eq!(raster.get(px, py), None, "drawn outside bounds at ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn test_sample_matches_cells_on_grid_points() {
        let result = default_reconstruct(&channels(&[(3, 200)]));
        let field = &result.field;
        let v = field.sample(2.0, 2.0).unwrap();
        assert_eq!(v, field.displayed(2, 2).unwrap());
        // Quad touching a masked corner is not drawn
        assert_eq!(field.sample(0.5, 0.5), None);
        assert_eq!(field.sample(2.5, 1.5), None);
        assert!(field.sample(1.5, 2.5).is_some());
    }

    #[test]
    fn test_markers_cover_bound_cells() {
        let result = default_reconstruct(&ChannelMap::new());
        assert_eq!(result.markers.len(), 8);
        let m = result.markers.iter().find(|m| m.channel == 5).unwrap();
        assert_eq!((m.row, m.col, m.x, m.y), (2, 1, 1.0, 2.0));
        assert!(result.field.smoothed.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_config_validation() {
        assert!(ReconstructionConfig::default().validate().is_ok());
        assert!(ReconstructionConfig::with_sigma(-1.0).validate().is_err());
        assert!(ReconstructionConfig::with_sigma(f64::NAN).validate().is_err());
        let zero_res = ReconstructionConfig {
            raster_resolution: 0,
            ..ReconstructionConfig::default()
        };
        assert!(zero_res.validate().is_err());
    }

    #[test]
    fn test_oversized_kernel_rejected() {
        assert!(ReconstructionConfig::with_sigma(16.0).validate().is_ok());
        assert!(ReconstructionConfig::with_sigma(1e9).validate().is_err());
        assert!(ReconstructionConfig::with_sigma(1e300).validate().is_err());
        let wide = ReconstructionConfig {
            truncate: 1e6,
            ..ReconstructionConfig::default()
        };
        assert!(wide.validate().is_err());
    }

    #[test]
    fn test_kernel_radius_is_capped() {
        let kernel = gaussian_kernel(1e300, 4.0);
        assert_eq!(kernel.len(), 2 * MAX_KERNEL_RADIUS + 1);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-9);

        let grid = vec![5.0; 16];
        let out = gaussian_filter(&grid, 4, 4, 1e300, 4.0);
        assert!(out.iter().all(|v| (v - 5.0).abs() < 1e-9));
    }
}
