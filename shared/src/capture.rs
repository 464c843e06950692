//! Turns raw pointer samples into densely spaced stroke points.
//!
//! Every segment between two samples is split into
//! `max(2, floor(distance / 2))` interpolation steps so the territory grid
//! never sees a gap wide enough to skip a cell. Capture owns the local paint
//! ledger and charges it per traveled distance.
//!
//! A stroke holds at most [`MAX_STROKE_POINTS`]. A segment that would push it
//! past that reports [`Extension::Full`] and the caller continues the gesture
//! as a fresh stroke with [`StrokeCapture::continue_stroke`].

use crate::error::PaintError;
use crate::ledger::PaintLedger;
use crate::stroke::{BrushStyle, Point, Stroke, StrokeId};
use crate::{MAX_STROKE_POINTS, MIN_PAINT_TO_BEGIN, PAINT_COST_PER_UNIT};
use log::debug;
use std::collections::HashMap;

/// Anchor of a stroke that is still being captured.
#[derive(Debug, Clone)]
struct LiveCapture {
    style: BrushStyle,
    last: Point,
    points: usize,
}

/// Result of feeding one raw sample into capture.
#[derive(Debug, Clone, PartialEq)]
pub enum Extension {
    /// Points to append to the stroke, in order
    Points(Vec<Point>),
    /// The sample did not move the pen
    Stationary,
    /// The bucket ran dry; nothing appended
    OutOfPaint,
    /// The segment does not fit in the stroke; nothing appended or charged
    Full,
}

#[derive(Debug, Clone)]
pub struct StrokeCapture {
    ledger: PaintLedger,
    next_seq: HashMap<u32, u32>,
    live: HashMap<StrokeId, LiveCapture>,
}

impl StrokeCapture {
    pub fn new(ledger: PaintLedger) -> Self {
        Self {
            ledger,
            next_seq: HashMap::new(),
            live: HashMap::new(),
        }
    }

    pub fn ledger(&self) -> &PaintLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut PaintLedger {
        &mut self.ledger
    }

    pub fn is_live(&self, id: StrokeId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn live_ids(&self) -> Vec<StrokeId> {
        let mut ids: Vec<StrokeId> = self.live.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Starts a stroke if the color's bucket holds at least one unit.
    pub fn begin(
        &mut self,
        author_id: u32,
        origin: Point,
        style: BrushStyle,
    ) -> Result<Stroke, PaintError> {
        let available = self.ledger.available(style.color, origin.timestamp)?;
        if available < MIN_PAINT_TO_BEGIN {
            debug!(
                "Rejecting stroke for author {}: {} has {:.2} units",
                author_id, style.color, available
            );
            return Err(PaintError::ResourceExhausted { color: style.color });
        }

        Ok(self.open(author_id, origin, style))
    }

    /// Closes capture of a full stroke and opens its successor at the same
    /// anchor and style. No paint check: the gesture is already underway.
    pub fn continue_stroke(&mut self, id: StrokeId) -> Result<Stroke, PaintError> {
        let live = self.live.remove(&id).ok_or(PaintError::UnknownStroke(id))?;
        let next = self.open(id.author, live.last, live.style);
        debug!("Stroke {} is full, continuing as {}", id, next.id);
        Ok(next)
    }

    fn open(&mut self, author_id: u32, origin: Point, style: BrushStyle) -> Stroke {
        let seq = self.next_seq.entry(author_id).or_insert(1);
        let id = StrokeId::new(author_id, *seq);
        *seq += 1;

        let stroke = Stroke::new(id, author_id, origin, style);
        self.live.insert(
            id,
            LiveCapture {
                style,
                last: stroke.points[0],
                points: stroke.points.len(),
            },
        );
        stroke
    }

    /// Interpolates from the previous recorded point to `raw` and charges the
    /// traveled distance to the ledger.
    pub fn extend(&mut self, id: StrokeId, raw: Point) -> Result<Extension, PaintError> {
        let live = self.live.get_mut(&id).ok_or(PaintError::UnknownStroke(id))?;

        let mut raw = raw;
        raw.timestamp = raw.timestamp.max(live.last.timestamp);

        let distance = live.last.distance_to(&raw);
        if distance <= f32::EPSILON {
            return Ok(Extension::Stationary);
        }
        if live.points + interpolation_steps(distance) > MAX_STROKE_POINTS {
            return Ok(Extension::Full);
        }

        match self
            .ledger
            .consume(live.style.color, distance * PAINT_COST_PER_UNIT, raw.timestamp)
        {
            Ok(()) => {}
            Err(PaintError::ResourceExhausted { .. }) => return Ok(Extension::OutOfPaint),
            Err(e) => return Err(e),
        }

        let points = interpolate(&live.last, &raw);
        live.last = raw;
        live.points += points.len();
        Ok(Extension::Points(points))
    }

    /// Ends capture for a stroke. Any further `extend` is an unknown stroke.
    pub fn finish(&mut self, id: StrokeId) -> Result<(), PaintError> {
        self.live
            .remove(&id)
            .map(|_| ())
            .ok_or(PaintError::UnknownStroke(id))
    }

    /// Forgets every live stroke without finishing it (canvas clear).
    pub fn drop_live(&mut self) {
        self.live.clear();
    }
}

/// Number of interpolation steps for a segment of the given length. Never
/// more than a fresh stroke can take.
pub fn interpolation_steps(distance: f32) -> usize {
    ((distance / 2.0).floor() as usize).clamp(2, MAX_STROKE_POINTS - 1)
}

/// Points strictly after `from` up to and including `to`.
pub fn interpolate(from: &Point, to: &Point) -> Vec<Point> {
    let steps = interpolation_steps(from.distance_to(to));
    (1..=steps)
        .map(|i| {
            if i == steps {
                *to
            } else {
                from.lerp(to, i as f32 / steps as f32)
            }
        })
        .collect()
}
