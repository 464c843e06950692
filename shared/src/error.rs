//! Error kinds produced by the paint engine.
//!
//! None of these are fatal. Callers log them and keep rendering the last
//! known-good state.

use crate::store::Ownership;
use crate::stroke::{Color, StrokeId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PaintError {
    /// The paint bucket for this color cannot cover the request.
    #[error("paint bucket for {color} is empty")]
    ResourceExhausted { color: Color },

    /// Update or end for a stroke this participant never saw start.
    #[error("unknown stroke {0}")]
    UnknownStroke(StrokeId),

    /// A message that decoded but carries unusable content.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Append/complete against a stroke owned by the other side of the
    /// local/remote split.
    #[error("stroke {id} is owned {owner}")]
    StaleOwnership { id: StrokeId, owner: Ownership },

    #[error("stroke {0} is already completed")]
    StrokeCompleted(StrokeId),

    #[error("stroke {0} already exists")]
    DuplicateStroke(StrokeId),

    #[error("no paint bucket for {0}")]
    UnknownColor(Color),

    #[error("invalid color literal {0:?}")]
    InvalidColor(String),
}

impl PaintError {
    /// Errors that are an expected consequence of unordered delivery and
    /// only worth a debug line.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            PaintError::UnknownStroke(_) | PaintError::StrokeCompleted(_)
        )
    }
}
