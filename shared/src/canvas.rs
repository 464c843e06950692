//! The replicated canvas: stroke store and territory grid behind one owner.
//!
//! Every store mutation that adds points is followed by the matching
//! `touch` before control returns, so territory never lags the store.

use crate::error::PaintError;
use crate::protocol::CanvasSpec;
use crate::store::{StrokePhase, StrokeSnapshot, StrokeStore};
use crate::stroke::{Point, Stroke, StrokeId};
use crate::territory::{CanvasArea, TerritoryGrid, TerritorySnapshot};
use crate::{PaintConfig, MAX_STROKE_POINTS};

#[derive(Debug, Clone)]
pub struct Canvas {
    spec: CanvasSpec,
    store: StrokeStore,
    territory: TerritoryGrid,
    /// Replaying a snapshot; territory arrives wholesale at the end
    restoring: bool,
    /// Territory cells received so far during a restore
    staged: Vec<CanvasArea>,
}

impl Canvas {
    pub fn new(spec: CanvasSpec) -> Self {
        Self {
            spec,
            store: StrokeStore::new(),
            territory: TerritoryGrid::new(spec.width, spec.height, spec.cell_size),
            restoring: false,
            staged: Vec::new(),
        }
    }

    pub fn from_config(config: &PaintConfig) -> Self {
        Self::new(CanvasSpec::from(config))
    }

    pub fn spec(&self) -> CanvasSpec {
        self.spec
    }

    pub fn store(&self) -> &StrokeStore {
        &self.store
    }

    pub fn territory(&self) -> &TerritoryGrid {
        &self.territory
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    pub fn phase(&self, id: StrokeId) -> Option<StrokePhase> {
        self.store.phase(id)
    }

    /// Rejects points further outside the canvas than `margin`.
    pub fn check_within(
        &self,
        id: StrokeId,
        points: &[Point],
        margin: f32,
    ) -> Result<(), PaintError> {
        let x_range = -margin..=self.spec.width + margin;
        let y_range = -margin..=self.spec.height + margin;
        match points
            .iter()
            .find(|p| !x_range.contains(&p.x) || !y_range.contains(&p.y))
        {
            Some(bad) => Err(PaintError::MalformedMessage(format!(
                "stroke {} has point ({}, {}) off the canvas",
                id, bad.x, bad.y
            ))),
            None => Ok(()),
        }
    }

    fn touch(&mut self, stroke: &Stroke, points: &[Point]) -> Vec<CanvasArea> {
        if self.restoring || points.is_empty() {
            return Vec::new();
        }
        self.territory.touch(stroke, points)
    }

    fn touch_stored(&mut self, id: StrokeId, points: &[Point]) -> Vec<CanvasArea> {
        match self.store.get(id).cloned() {
            Some(stroke) => self.touch(&stroke, points),
            None => Vec::new(),
        }
    }

    pub fn start_local(&mut self, stroke: Stroke) -> Result<Vec<CanvasArea>, PaintError> {
        let origin = stroke.points.clone();
        let id = stroke.id;
        self.store.put_local(stroke)?;
        Ok(self.touch_stored(id, &origin))
    }

    pub fn extend_local(
        &mut self,
        id: StrokeId,
        points: &[Point],
    ) -> Result<Vec<CanvasArea>, PaintError> {
        self.store.append_local(id, points)?;
        Ok(self.touch_stored(id, points))
    }

    pub fn finish_local(&mut self, id: StrokeId) -> Result<Stroke, PaintError> {
        self.store.complete_local(id)
    }

    /// `None` when the stroke is already known remotely.
    pub fn start_remote(&mut self, stroke: Stroke) -> Result<Option<Vec<CanvasArea>>, PaintError> {
        let origin = stroke.points.clone();
        let id = stroke.id;
        if !self.store.put_remote(stroke)? {
            return Ok(None);
        }
        Ok(Some(self.touch_stored(id, &origin)))
    }

    pub fn extend_remote(
        &mut self,
        id: StrokeId,
        points: &[Point],
    ) -> Result<Vec<CanvasArea>, PaintError> {
        let held = self.store.get(id).map_or(0, |stroke| stroke.points.len());
        if held + points.len() > MAX_STROKE_POINTS {
            return Err(PaintError::MalformedMessage(format!(
                "stroke {} would grow past {} points",
                id, MAX_STROKE_POINTS
            )));
        }
        self.store.append_remote(id, points)?;
        Ok(self.touch_stored(id, points))
    }

    /// Installs the author's final stroke and touches only the points that
    /// were not already applied from live updates.
    pub fn finish_remote(
        &mut self,
        id: StrokeId,
        final_stroke: Stroke,
    ) -> Result<Vec<CanvasArea>, PaintError> {
        let unseen = match self.store.get(id) {
            Some(live) => unseen_points(&live.points, &final_stroke.points),
            None => final_stroke.points.clone(),
        };
        self.store.complete_remote(id, final_stroke)?;
        Ok(self.touch_stored(id, &unseen))
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.territory.reset();
    }

    /// Empties the canvas ahead of a snapshot replay. Strokes replayed until
    /// [`Canvas::finish_restore`] do not touch territory.
    pub fn begin_restore(&mut self) {
        self.clear();
        self.staged.clear();
        self.restoring = true;
    }

    /// Holds one chunk of the snapshot's territory until the restore ends.
    pub fn stage_cells(&mut self, cells: Vec<CanvasArea>) -> Result<(), PaintError> {
        if self.staged.len() + cells.len() > self.territory.cells().len() {
            return Err(PaintError::MalformedMessage(format!(
                "snapshot carries more than {} cells",
                self.territory.cells().len()
            )));
        }
        self.staged.extend(cells);
        Ok(())
    }

    /// Installs the staged cells plus the final chunk.
    pub fn finish_restore(&mut self, cells: Vec<CanvasArea>) -> Result<(), PaintError> {
        self.restoring = false;
        let mut all = std::mem::take(&mut self.staged);
        all.extend(cells);
        self.territory.restore(all)
    }

    pub fn stroke_snapshot(&self) -> StrokeSnapshot {
        self.store.split_snapshot()
    }

    pub fn territory_snapshot(&self) -> TerritorySnapshot {
        self.territory.snapshot()
    }
}

/// Points of `full` not matched, in order, by `seen`. `seen` is what arrived
/// live and may be missing any run of points the transport dropped.
pub fn unseen_points(seen: &[Point], full: &[Point]) -> Vec<Point> {
    let mut cursor = 0;
    let mut unseen = Vec::new();
    for point in full {
        if cursor < seen.len() && seen[cursor] == *point {
            cursor += 1;
        } else {
            unseen.push(*point);
        }
    }
    unseen
}
