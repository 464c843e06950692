//! Authoritative map of stroke id to stroke.
//!
//! Every id has exactly one writer: the local author while it is capturing,
//! or the network once the id arrived from elsewhere. Calls from the wrong
//! side are rejected with [`PaintError::StaleOwnership`].

use crate::error::PaintError;
use crate::stroke::{Point, Stroke, StrokeId};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Local,
    Remote,
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ownership::Local => write!(f, "locally"),
            Ownership::Remote => write!(f, "remotely"),
        }
    }
}

/// Protocol state of a stroke as seen by this participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokePhase {
    LiveLocal,
    LiveRemote,
    Completed,
}

#[derive(Debug, Clone)]
struct Entry {
    stroke: Stroke,
    ownership: Ownership,
}

/// Strokes grouped by render layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrokeSnapshot {
    pub completed: Vec<Stroke>,
    pub live_remote: Vec<Stroke>,
    pub live_local: Vec<Stroke>,
}

impl StrokeSnapshot {
    pub fn len(&self) -> usize {
        self.completed.len() + self.live_remote.len() + self.live_local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrokeStore {
    entries: HashMap<StrokeId, Entry>,
    /// Insertion order, used as paint order
    order: Vec<StrokeId>,
}

impl StrokeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: StrokeId) -> Option<&Stroke> {
        self.entries.get(&id).map(|entry| &entry.stroke)
    }

    pub fn ownership(&self, id: StrokeId) -> Option<Ownership> {
        self.entries.get(&id).map(|entry| entry.ownership)
    }

    pub fn phase(&self, id: StrokeId) -> Option<StrokePhase> {
        self.entries.get(&id).map(|entry| {
            if entry.stroke.completed {
                StrokePhase::Completed
            } else {
                match entry.ownership {
                    Ownership::Local => StrokePhase::LiveLocal,
                    Ownership::Remote => StrokePhase::LiveRemote,
                }
            }
        })
    }

    fn insert(&mut self, stroke: Stroke, ownership: Ownership) {
        let id = stroke.id;
        if self.entries.insert(id, Entry { stroke, ownership }).is_none() {
            self.order.push(id);
        }
    }

    fn entry_mut(&mut self, id: StrokeId, side: Ownership) -> Result<&mut Entry, PaintError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(PaintError::UnknownStroke(id))?;
        if entry.ownership != side {
            return Err(PaintError::StaleOwnership {
                id,
                owner: entry.ownership,
            });
        }
        Ok(entry)
    }

    pub fn put_local(&mut self, stroke: Stroke) -> Result<(), PaintError> {
        if let Some(owner) = self.ownership(stroke.id) {
            return Err(match owner {
                Ownership::Local => PaintError::DuplicateStroke(stroke.id),
                Ownership::Remote => PaintError::StaleOwnership {
                    id: stroke.id,
                    owner,
                },
            });
        }
        self.insert(stroke, Ownership::Local);
        Ok(())
    }

    pub fn append_local(&mut self, id: StrokeId, points: &[Point]) -> Result<(), PaintError> {
        self.entry_mut(id, Ownership::Local)?.stroke.append(points)
    }

    pub fn complete_local(&mut self, id: StrokeId) -> Result<Stroke, PaintError> {
        let entry = self.entry_mut(id, Ownership::Local)?;
        if entry.stroke.completed {
            return Err(PaintError::StrokeCompleted(id));
        }
        entry.stroke.complete();
        Ok(entry.stroke.clone())
    }

    /// Adds a stroke that originated elsewhere. A repeated start for an id
    /// already held remotely is a no-op and returns `false`.
    pub fn put_remote(&mut self, stroke: Stroke) -> Result<bool, PaintError> {
        match self.ownership(stroke.id) {
            Some(Ownership::Local) => Err(PaintError::StaleOwnership {
                id: stroke.id,
                owner: Ownership::Local,
            }),
            Some(Ownership::Remote) => Ok(false),
            None => {
                self.insert(stroke, Ownership::Remote);
                Ok(true)
            }
        }
    }

    pub fn append_remote(&mut self, id: StrokeId, points: &[Point]) -> Result<(), PaintError> {
        self.entry_mut(id, Ownership::Remote)?.stroke.append(points)
    }

    /// Replaces the stroke wholesale with its author's final version,
    /// inserting it if the start was never seen.
    pub fn complete_remote(&mut self, id: StrokeId, final_stroke: Stroke) -> Result<(), PaintError> {
        if final_stroke.id != id {
            return Err(PaintError::MalformedMessage(format!(
                "final stroke {} sent under id {}",
                final_stroke.id, id
            )));
        }
        if let Some(Ownership::Local) = self.ownership(id) {
            return Err(PaintError::StaleOwnership {
                id,
                owner: Ownership::Local,
            });
        }

        let mut final_stroke = final_stroke;
        final_stroke.completed = true;
        self.insert(final_stroke, Ownership::Remote);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// All strokes in insertion order.
    pub fn snapshot(&self) -> Vec<Stroke> {
        self.strokes().cloned().collect()
    }

    pub fn strokes(&self) -> impl Iterator<Item = &Stroke> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| &entry.stroke)
    }

    pub fn completed(&self) -> impl Iterator<Item = &Stroke> {
        self.strokes().filter(|stroke| stroke.completed)
    }

    /// Strokes grouped by render layer, each group in insertion order.
    pub fn split_snapshot(&self) -> StrokeSnapshot {
        let mut snapshot = StrokeSnapshot::default();
        for id in &self.order {
            let Some(entry) = self.entries.get(id) else {
                continue;
            };
            let stroke = entry.stroke.clone();
            match (stroke.completed, entry.ownership) {
                (true, _) => snapshot.completed.push(stroke),
                (false, Ownership::Remote) => snapshot.live_remote.push(stroke),
                (false, Ownership::Local) => snapshot.live_local.push(stroke),
            }
        }
        snapshot
    }
}
