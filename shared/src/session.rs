//! One participant's view of the shared canvas.
//!
//! `PaintSession` is the handle every caller goes through: the pointer and
//! bot drive the stroke lifecycle, the network layer feeds `apply_remote`
//! and drains outbound packets, and the renderer reads snapshots.
//!
//! A gesture longer than one stroke can hold is split into a chain of
//! strokes. Callers keep using the id `begin_stroke` returned; the session
//! maps it to the segment currently being captured.

use crate::canvas::Canvas;
use crate::capture::{Extension, StrokeCapture};
use crate::error::PaintError;
use crate::events::{EventBus, PaintEvent, PaintEventKind};
use crate::ledger::{BucketLevel, PaintLedger};
use crate::protocol::{CanvasSpec, Packet};
use crate::store::StrokeSnapshot;
use crate::stroke::{BrushStyle, Point, Stroke, StrokeId};
use crate::sync::{Applied, SyncProtocol};
use crate::territory::{CanvasArea, OwnerStats, TerritorySnapshot};
use crate::PaintConfig;
use log::{debug, info, warn};
use std::collections::HashMap;
use tokio::sync::mpsc;

pub struct PaintSession {
    participant_id: u32,
    config: PaintConfig,
    canvas: Canvas,
    capture: StrokeCapture,
    sync: SyncProtocol,
    events: EventBus,
    /// Caller's stroke handle to the segment now live
    continued: HashMap<StrokeId, StrokeId>,
}

impl PaintSession {
    pub fn new(participant_id: u32, config: &PaintConfig) -> Self {
        Self {
            participant_id,
            config: config.clone(),
            canvas: Canvas::from_config(config),
            capture: StrokeCapture::new(PaintLedger::new(config, 0)),
            sync: SyncProtocol::new(),
            events: EventBus::new(),
            continued: HashMap::new(),
        }
    }

    pub fn participant_id(&self) -> u32 {
        self.participant_id
    }

    /// Takes on a new participant id after a reconnect. Live strokes are
    /// finished locally and any stroke traffic still queued under the old id
    /// is dropped; the server already closed that author's strokes.
    pub fn rebind(&mut self, participant_id: u32) {
        if participant_id != self.participant_id {
            self.abandon_live_strokes();
            let dropped = self.sync.discard_from(self.participant_id);
            info!(
                "Session rebound from participant {} to {}, dropped {} queued packets",
                self.participant_id, participant_id, dropped
            );
            self.participant_id = participant_id;
        }
    }

    pub fn config(&self) -> &PaintConfig {
        &self.config
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn canvas_spec(&self) -> CanvasSpec {
        self.canvas.spec()
    }

    pub fn ledger(&self) -> &PaintLedger {
        self.capture.ledger()
    }

    pub fn ledger_mut(&mut self) -> &mut PaintLedger {
        self.capture.ledger_mut()
    }

    pub fn live_strokes(&self) -> Vec<StrokeId> {
        self.capture.live_ids()
    }

    fn resolve(&self, handle: StrokeId) -> StrokeId {
        self.continued.get(&handle).copied().unwrap_or(handle)
    }

    pub fn subscribe(&mut self, kind: PaintEventKind) -> mpsc::UnboundedReceiver<PaintEvent> {
        self.events.subscribe(kind)
    }

    fn publish_changed(&mut self, cells: Vec<CanvasArea>) {
        if !cells.is_empty() {
            self.events.publish(PaintEvent::TerritoryChanged { cells });
        }
    }

    /// Starts a local stroke. Rejected without side effects when the
    /// color's bucket holds less than one unit.
    pub fn begin_stroke(
        &mut self,
        author_id: u32,
        origin: Point,
        style: BrushStyle,
    ) -> Result<Stroke, PaintError> {
        let stroke = match self.capture.begin(author_id, origin, style) {
            Ok(stroke) => stroke,
            Err(e) => {
                if let PaintError::ResourceExhausted { color } = e {
                    self.events.publish(PaintEvent::PaintEmpty { color });
                }
                return Err(e);
            }
        };

        let changed = match self.canvas.start_local(stroke.clone()) {
            Ok(changed) => changed,
            Err(e) => {
                let _ = self.capture.finish(stroke.id);
                return Err(e);
            }
        };
        self.sync.queue_start(&stroke);

        self.events.publish(PaintEvent::StrokeStarted {
            id: stroke.id,
            author_id,
            local: true,
        });
        self.publish_changed(changed);
        Ok(stroke)
    }

    /// Feeds one raw pointer sample and returns the points it added.
    pub fn extend_stroke(&mut self, id: StrokeId, raw: Point) -> Result<Vec<Point>, PaintError> {
        let mut current = self.resolve(id);
        let points = loop {
            match self.capture.extend(current, raw)? {
                Extension::Points(points) => break points,
                Extension::Stationary => return Ok(Vec::new()),
                Extension::OutOfPaint => {
                    if let Some(stroke) = self.canvas.store().get(current) {
                        let color = stroke.color;
                        self.events.publish(PaintEvent::PaintEmpty { color });
                    }
                    return Ok(Vec::new());
                }
                // A fresh segment always has room, so this runs at most once
                Extension::Full => current = self.continue_stroke(id, current)?,
            }
        };

        let changed = self.canvas.extend_local(current, &points)?;
        self.sync.queue_update(current, &points);
        self.publish_changed(changed);
        Ok(points)
    }

    /// Completes the full segment `current` and starts its successor.
    fn continue_stroke(
        &mut self,
        handle: StrokeId,
        current: StrokeId,
    ) -> Result<StrokeId, PaintError> {
        let next = self.capture.continue_stroke(current)?;
        self.complete_segment(current)?;

        let changed = self.canvas.start_local(next.clone())?;
        self.sync.queue_start(&next);
        self.continued.insert(handle, next.id);

        self.events.publish(PaintEvent::StrokeStarted {
            id: next.id,
            author_id: next.author_id,
            local: true,
        });
        self.publish_changed(changed);
        Ok(next.id)
    }

    fn complete_segment(&mut self, id: StrokeId) -> Result<Stroke, PaintError> {
        let stroke = self.canvas.finish_local(id)?;
        self.sync.queue_end(&stroke);

        self.events.publish(PaintEvent::StrokeCompleted {
            stroke: stroke.clone(),
            local: true,
        });
        Ok(stroke)
    }

    /// Completes the stroke. For a gesture that was continued, this is the
    /// last segment.
    pub fn finish_stroke(&mut self, id: StrokeId) -> Result<Stroke, PaintError> {
        let current = self.resolve(id);
        self.capture.finish(current)?;
        self.continued.remove(&id);
        self.complete_segment(current)
    }

    /// Finishes every local stroke still being captured with the points it
    /// has so far.
    pub fn abandon_live_strokes(&mut self) -> Vec<Stroke> {
        let mut finished = Vec::new();
        for id in self.capture.live_ids() {
            match self.finish_stroke(id) {
                Ok(stroke) => finished.push(stroke),
                Err(e) => debug!("Could not finish stroke {}: {}", id, e),
            }
        }
        self.continued.clear();
        finished
    }

    pub fn clear_canvas(&mut self) {
        self.canvas.clear();
        self.capture.drop_live();
        self.continued.clear();
        self.sync.queue_clear();
        self.events.publish(PaintEvent::CanvasCleared);
    }

    /// Applies a packet from the network. Errors are logged here and
    /// returned for callers that care; the canvas is left as it was.
    pub fn apply_remote(&mut self, packet: Packet) -> Result<Applied, PaintError> {
        let applied = match self.sync.apply_inbound(&mut self.canvas, packet) {
            Ok(applied) => applied,
            Err(e) => {
                if e.is_benign() {
                    debug!("Dropped remote message: {}", e);
                } else {
                    warn!("Rejected remote message: {}", e);
                }
                return Err(e);
            }
        };

        match &applied {
            Applied::StrokeStarted {
                id,
                author_id,
                changed,
            } => {
                self.events.publish(PaintEvent::StrokeStarted {
                    id: *id,
                    author_id: *author_id,
                    local: false,
                });
                self.publish_changed(changed.clone());
            }
            Applied::StrokeExtended { changed, .. } => self.publish_changed(changed.clone()),
            Applied::StrokeCompleted { stroke, changed } => {
                self.events.publish(PaintEvent::StrokeCompleted {
                    stroke: stroke.clone(),
                    local: false,
                });
                self.publish_changed(changed.clone());
            }
            Applied::Cleared => {
                self.capture.drop_live();
                self.continued.clear();
                self.events.publish(PaintEvent::CanvasCleared);
            }
            Applied::SnapshotStarted => {
                self.capture.drop_live();
                self.continued.clear();
            }
            Applied::SnapshotRestored { strokes } => {
                self.events
                    .publish(PaintEvent::SnapshotRestored { strokes: *strokes });
            }
            Applied::SnapshotStaged { .. } | Applied::Ignored | Applied::Unhandled => {}
        }

        Ok(applied)
    }

    /// Finishes local work in flight and asks the peer for a full snapshot.
    pub fn request_resync(&mut self) {
        self.abandon_live_strokes();
        self.sync.queue_snapshot_request();
    }

    pub fn drain_outbound(&mut self) -> Vec<Packet> {
        self.sync.drain()
    }

    pub fn refill_tick(&mut self, now: u64) {
        self.capture.ledger_mut().refill_tick(now);
    }

    pub fn paint_levels(&self) -> Vec<BucketLevel> {
        self.capture.ledger().levels()
    }

    pub fn stats_by_owner(&self) -> Vec<OwnerStats> {
        self.canvas.territory().stats_by_owner()
    }

    pub fn stroke_snapshot(&self) -> StrokeSnapshot {
        self.canvas.stroke_snapshot()
    }

    pub fn territory_snapshot(&self) -> TerritorySnapshot {
        self.canvas.territory_snapshot()
    }
}
