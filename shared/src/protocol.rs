use crate::stroke::{BrushType, Color, Point, Stroke, StrokeId};
use crate::territory::{CanvasArea, OwnerStats};
use crate::error::PaintError;
use crate::{PaintConfig, MAX_CANVAS_DIMENSION, MAX_GRID_CELLS, MIN_CELL_SIZE};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// Canvas geometry the server hands to every participant on connect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSpec {
    pub width: f32,
    pub height: f32,
    pub cell_size: f32,
}

impl From<&PaintConfig> for CanvasSpec {
    fn from(config: &PaintConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            cell_size: config.cell_size,
        }
    }
}

impl CanvasSpec {
    pub fn cols(&self) -> usize {
        (self.width / self.cell_size).ceil() as usize
    }

    pub fn rows(&self) -> usize {
        (self.height / self.cell_size).ceil() as usize
    }

    /// Geometry a room can actually serve: bounded size and a grid whose
    /// snapshot fits a bounded number of datagrams.
    pub fn validate(&self) -> Result<(), PaintError> {
        let dimension_ok = |v: f32| v.is_finite() && v >= 1.0 && v <= MAX_CANVAS_DIMENSION;
        if !dimension_ok(self.width) || !dimension_ok(self.height) {
            return Err(PaintError::MalformedMessage(format!(
                "canvas {}x{} is outside 1..={}",
                self.width, self.height, MAX_CANVAS_DIMENSION
            )));
        }
        if !(self.cell_size.is_finite() && self.cell_size >= MIN_CELL_SIZE) {
            return Err(PaintError::MalformedMessage(format!(
                "cell size {} is below {}",
                self.cell_size, MIN_CELL_SIZE
            )));
        }
        let cells = self.cols() * self.rows();
        if cells > MAX_GRID_CELLS {
            return Err(PaintError::MalformedMessage(format!(
                "{} territory cells exceed the limit of {}",
                cells, MAX_GRID_CELLS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Disconnect,
    Heartbeat {
        timestamp: u64,
    },
    SnapshotRequest,

    Connected {
        client_id: u32,
        canvas: CanvasSpec,
    },
    Disconnected {
        reason: String,
    },
    HeartbeatAck {
        timestamp: u64,
    },
    SnapshotBegin {
        stroke_count: u32,
    },
    /// Part of the territory grid; the rest follows in further chunks and
    /// the closing `SnapshotEnd`
    SnapshotCells {
        cells: Vec<CanvasArea>,
    },
    SnapshotEnd {
        cells: Vec<CanvasArea>,
    },
    Scoreboard {
        standings: Vec<OwnerStats>,
        remaining_ms: u64,
    },
    RoundOver {
        standings: Vec<OwnerStats>,
        winner: Option<u32>,
    },

    StrokeStart {
        stroke_id: StrokeId,
        author_id: u32,
        color: Color,
        brush_size: f32,
        brush_type: BrushType,
        opacity: f32,
        first_point: Point,
    },
    StrokeUpdate {
        stroke_id: StrokeId,
        new_points: Vec<Point>,
    },
    StrokeEnd {
        stroke_id: StrokeId,
        final_stroke: Stroke,
    },
    CanvasClear,
}

impl Packet {
    pub fn stroke_start(stroke: &Stroke) -> Self {
        Packet::StrokeStart {
            stroke_id: stroke.id,
            author_id: stroke.author_id,
            color: stroke.color,
            brush_size: stroke.brush_size,
            brush_type: stroke.brush_type,
            opacity: stroke.opacity,
            first_point: stroke.points[0],
        }
    }

    pub fn stroke_end(stroke: &Stroke) -> Self {
        Packet::StrokeEnd {
            stroke_id: stroke.id,
            final_stroke: stroke.clone(),
        }
    }

    /// Author claimed by a stroke message, `None` for everything else.
    pub fn stroke_author(&self) -> Option<u32> {
        match self {
            Packet::StrokeStart {
                stroke_id,
                author_id,
                ..
            } => {
                if stroke_id.author == *author_id {
                    Some(*author_id)
                } else {
                    None
                }
            }
            Packet::StrokeUpdate { stroke_id, .. } => Some(stroke_id.author),
            Packet::StrokeEnd {
                stroke_id,
                final_stroke,
            } => {
                if stroke_id.author == final_stroke.author_id {
                    Some(stroke_id.author)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Latest point timestamp carried by a stroke message.
    pub fn newest_timestamp(&self) -> Option<u64> {
        match self {
            Packet::StrokeStart { first_point, .. } => Some(first_point.timestamp),
            Packet::StrokeUpdate { new_points, .. } => {
                new_points.iter().map(|p| p.timestamp).max()
            }
            Packet::StrokeEnd { final_stroke, .. } => {
                final_stroke.points.iter().map(|p| p.timestamp).max()
            }
            _ => None,
        }
    }

    pub fn is_stroke_message(&self) -> bool {
        matches!(
            self,
            Packet::StrokeStart { .. } | Packet::StrokeUpdate { .. } | Packet::StrokeEnd { .. }
        )
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
