//! Anatomical sensor layout and foot outline
//!
//! The layout is a fixed 4×4 grid (row 0 = toes, row 3 = heel). Grid
//! coordinates are `x = column`, `y = row`; the outline polygon lives in the
//! same coordinate system.

use crate::error::PlantarError;
use crate::types::is_valid_channel;
use serde::{Deserialize, Serialize};

pub const LAYOUT_ROWS: usize = 4;
pub const LAYOUT_COLS: usize = 4;

/// Fixed mapping from grid cell to sensor channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LayoutCells", into = "LayoutCells")]
pub struct FootLayout {
    cells: LayoutCells,
}

/// Row-major cell bindings
pub type LayoutCells = [[Option<u8>; LAYOUT_COLS]; LAYOUT_ROWS];

impl Default for FootLayout {
    fn default() -> Self {
        Self {
            cells: [
                [Some(0), None, None, None],       // toes
                [Some(1), Some(4), Some(2), None], // ball
                [None, Some(5), Some(3), None],    // arch
                [None, Some(6), Some(7), None],    // heel
            ],
        }
    }
}

impl TryFrom<LayoutCells> for FootLayout {
    type Error = PlantarError;

    fn try_from(cells: LayoutCells) -> Result<Self, Self::Error> {
        Self::new(cells)
    }
}

impl From<FootLayout> for LayoutCells {
    fn from(layout: FootLayout) -> Self {
        layout.cells
    }
}

impl FootLayout {
    /// Build a layout; channel ids must be in range and bound at most once
    pub fn new(cells: LayoutCells) -> Result<Self, PlantarError> {
        let mut seen = [false; 256];
        for row in &cells {
            for channel in row.iter().flatten() {
                if !is_valid_channel(*channel) {
                    return Err(PlantarError::InvalidLayout(format!(
                        "channel {channel} is not a converter input"
                    )));
                }
                if seen[*channel as usize] {
                    return Err(PlantarError::InvalidLayout(format!(
                        "channel {channel} bound to more than one cell"
                    )));
                }
                seen[*channel as usize] = true;
            }
        }
        Ok(Self { cells })
    }

    pub fn rows(&self) -> usize {
        LAYOUT_ROWS
    }

    pub fn cols(&self) -> usize {
        LAYOUT_COLS
    }

    /// Channel bound to a cell, if any
    pub fn channel_at(&self, row: usize, col: usize) -> Option<u8> {
        self.cells.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    /// Cell bound to a channel
    pub fn position_of(&self, channel_id: u8) -> Option<(usize, usize)> {
        self.bound_cells()
            .find(|&(_, _, c)| c == channel_id)
            .map(|(row, col, _)| (row, col))
    }

    /// `(row, col, channel)` for every bound cell, row-major
    pub fn bound_cells(&self) -> impl Iterator<Item = (usize, usize, u8)> + '_ {
        self.cells.iter().enumerate().flat_map(|(row, cols)| {
            cols.iter()
                .enumerate()
                .filter_map(move |(col, c)| c.map(|channel| (row, col, channel)))
        })
    }

    /// Row-major mask, `true` where no sensor is bound
    pub fn unassigned_mask(&self) -> Vec<bool> {
        self.cells
            .iter()
            .flat_map(|row| row.iter().map(Option::is_none))
            .collect()
    }
}

/// Closed polygon used as the clipping boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct FootOutline {
    points: Vec<[f64; 2]>,
}

impl Default for FootOutline {
    fn default() -> Self {
        let xs = [0.5, 0.0, 0.875, 0.75, 0.75, 2.25, 2.25, 2.25, 2.375, 2.0, 0.5];
        let ys = [0.375, 1.0, 2.0, 3.0, 3.0, 3.0, 2.5, 2.0, 1.0, 0.5, 0.375];
        Self {
            points: xs.iter().zip(ys.iter()).map(|(&x, &y)| [x, y]).collect(),
        }
    }
}

impl TryFrom<Vec<[f64; 2]>> for FootOutline {
    type Error = PlantarError;

    fn try_from(points: Vec<[f64; 2]>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<FootOutline> for Vec<[f64; 2]> {
    fn from(outline: FootOutline) -> Self {
        outline.points
    }
}

impl FootOutline {
    /// Build an outline from `[x, y]` points; the loop is closed implicitly
    pub fn new(points: Vec<[f64; 2]>) -> Result<Self, PlantarError> {
        if points.iter().flatten().any(|v| !v.is_finite()) {
            return Err(PlantarError::InvalidOutline(
                "coordinates must be finite".to_string(),
            ));
        }
        let mut distinct: Vec<[f64; 2]> = Vec::new();
        for p in &points {
            if !distinct.contains(p) {
                distinct.push(*p);
            }
        }
        if distinct.len() < 3 {
            return Err(PlantarError::InvalidOutline(format!(
                "need at least 3 distinct points, got {}",
                distinct.len()
            )));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    /// Even-odd containment test
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let n = self.points.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let [xi, yi] = self.points[i];
            let [xj, yj] = self.points[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Axis-aligned bounds as `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.points.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), &[x, y]| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        )
    }
}
