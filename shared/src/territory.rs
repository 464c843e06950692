//! Territory aggregation over a fixed grid.
//!
//! Each stroke point bumps the coverage of the cell it lands in and claims
//! the cell for the stroke's author. Ownership is last-writer-wins keyed on
//! the point's authoring timestamp, so once every stroke's final point list
//! has been applied each cell belongs to whoever painted it last, whatever
//! order the messages arrived in. While overlapping strokes are still live
//! the transient owner can depend on delivery order; that is accepted
//! eventual consistency. Equal timestamps from different authors resolve in
//! delivery order.

use crate::error::PaintError;
use crate::stroke::{Color, Point, Stroke};
use crate::{COVERAGE_INCREMENT, COVERAGE_NOISE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasArea {
    pub grid_x: u32,
    pub grid_y: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Fraction painted, in [0, 1]
    pub paint_coverage: f32,
    pub owner_id: Option<u32>,
    pub dominant_color: Option<Color>,
    /// Timestamp of the point that last claimed the cell
    pub last_touch: u64,
}

impl CanvasArea {
    fn new(grid_x: u32, grid_y: u32, cell_size: f32) -> Self {
        Self {
            grid_x,
            grid_y,
            x: grid_x as f32 * cell_size,
            y: grid_y as f32 * cell_size,
            width: cell_size,
            height: cell_size,
            paint_coverage: 0.0,
            owner_id: None,
            dominant_color: None,
            last_touch: 0,
        }
    }

    fn reset(&mut self) {
        self.paint_coverage = 0.0;
        self.owner_id = None;
        self.dominant_color = None;
        self.last_touch = 0;
    }
}

/// Coverage totals for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerStats {
    pub owner_id: u32,
    pub total_coverage: f32,
    pub color: Color,
    pub cells: u32,
}

/// Cells as handed to the renderer, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TerritorySnapshot {
    pub cols: u32,
    pub rows: u32,
    pub cell_size: f32,
    pub cells: Vec<CanvasArea>,
}

#[derive(Debug, Clone)]
pub struct TerritoryGrid {
    cols: u32,
    rows: u32,
    cell_size: f32,
    width: f32,
    height: f32,
    cells: Vec<CanvasArea>,
}

impl TerritoryGrid {
    /// Partitions a `width` x `height` canvas into square cells. The grid is
    /// never resized afterwards.
    pub fn new(width: f32, height: f32, cell_size: f32) -> Self {
        let cell_size = cell_size.max(1.0);
        let width = width.max(cell_size);
        let height = height.max(cell_size);
        let cols = (width / cell_size).ceil() as u32;
        let rows = (height / cell_size).ceil() as u32;

        let cells = (0..rows)
            .flat_map(|gy| (0..cols).map(move |gx| CanvasArea::new(gx, gy, cell_size)))
            .collect();

        Self {
            cols,
            rows,
            cell_size,
            width,
            height,
            cells,
        }
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn cells(&self) -> &[CanvasArea] {
        &self.cells
    }

    pub fn cell(&self, grid_x: u32, grid_y: u32) -> Option<&CanvasArea> {
        if grid_x >= self.cols || grid_y >= self.rows {
            return None;
        }
        self.cells.get((grid_y * self.cols + grid_x) as usize)
    }

    /// Index of the cell containing a canvas position.
    pub fn cell_index_at(&self, x: f32, y: f32) -> Option<usize> {
        if !(x >= 0.0 && y >= 0.0 && x < self.width && y < self.height) {
            return None;
        }
        let gx = ((x / self.cell_size) as u32).min(self.cols - 1);
        let gy = ((y / self.cell_size) as u32).min(self.rows - 1);
        Some((gy * self.cols + gx) as usize)
    }

    /// Applies a new range of `stroke`'s points and returns each changed
    /// cell once, in first-touched order.
    pub fn touch(&mut self, stroke: &Stroke, points: &[Point]) -> Vec<CanvasArea> {
        let mut changed = Vec::new();
        let mut seen = BTreeSet::new();

        for point in points {
            let Some(index) = self.cell_index_at(point.x, point.y) else {
                continue;
            };
            let cell = &mut self.cells[index];

            cell.paint_coverage = (cell.paint_coverage + COVERAGE_INCREMENT).min(1.0);
            if cell.owner_id.is_none() || point.timestamp >= cell.last_touch {
                cell.owner_id = Some(stroke.author_id);
                cell.dominant_color = Some(stroke.color);
                cell.last_touch = point.timestamp;
            }

            if seen.insert(index) {
                changed.push(index);
            }
        }

        changed.into_iter().map(|i| self.cells[i].clone()).collect()
    }

    /// Sums coverage of cells above the noise threshold, grouped by owner,
    /// sorted by descending coverage.
    pub fn stats_by_owner(&self) -> Vec<OwnerStats> {
        // owner -> (total, cells, best coverage, color of best cell)
        let mut totals: BTreeMap<u32, (f32, u32, f32, Color)> = BTreeMap::new();

        for cell in &self.cells {
            if cell.paint_coverage <= COVERAGE_NOISE_THRESHOLD {
                continue;
            }
            let (Some(owner), Some(color)) = (cell.owner_id, cell.dominant_color) else {
                continue;
            };

            let entry = totals
                .entry(owner)
                .or_insert((0.0, 0, f32::MIN, color));
            entry.0 += cell.paint_coverage;
            entry.1 += 1;
            if cell.paint_coverage > entry.2 {
                entry.2 = cell.paint_coverage;
                entry.3 = color;
            }
        }

        let mut stats: Vec<OwnerStats> = totals
            .into_iter()
            .map(|(owner_id, (total_coverage, cells, _, color))| OwnerStats {
                owner_id,
                total_coverage,
                color,
                cells,
            })
            .collect();

        stats.sort_by(|a, b| {
            b.total_coverage
                .partial_cmp(&a.total_coverage)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.owner_id.cmp(&b.owner_id))
        });
        stats
    }

    /// The participant with the most counted coverage, if any.
    pub fn leader(&self) -> Option<OwnerStats> {
        self.stats_by_owner().into_iter().next()
    }

    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.reset();
        }
    }

    pub fn snapshot(&self) -> TerritorySnapshot {
        TerritorySnapshot {
            cols: self.cols,
            rows: self.rows,
            cell_size: self.cell_size,
            cells: self.cells.clone(),
        }
    }

    /// Replaces every cell with a peer's copy of the same grid. The cells
    /// may arrive in any order but must cover the grid exactly once.
    pub fn restore(&mut self, cells: Vec<CanvasArea>) -> Result<(), PaintError> {
        if cells.len() != self.cells.len() {
            return Err(PaintError::MalformedMessage(format!(
                "territory snapshot has {} cells, grid has {}",
                cells.len(),
                self.cells.len()
            )));
        }

        let mut restored = cells;
        restored.sort_by_key(|cell| (cell.grid_y, cell.grid_x));
        for (index, cell) in restored.iter_mut().enumerate() {
            let expected_x = index as u32 % self.cols;
            let expected_y = index as u32 / self.cols;
            if cell.grid_x != expected_x || cell.grid_y != expected_y {
                return Err(PaintError::MalformedMessage(format!(
                    "territory cell {} is at ({}, {}), expected ({}, {})",
                    index, cell.grid_x, cell.grid_y, expected_x, expected_y
                )));
            }
            cell.paint_coverage = if cell.paint_coverage.is_finite() {
                cell.paint_coverage.clamp(0.0, 1.0)
            } else {
                0.0
            };
        }

        self.cells = restored;
        Ok(())
    }
}
