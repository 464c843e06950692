//! Points, colors, brush styles and strokes.

use crate::error::PaintError;
use crate::MAX_STROKE_POINTS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Globally unique stroke identifier.
///
/// Participant ids are handed out uniquely by the server and `seq` is
/// monotonic per author, so the pair never collides.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StrokeId {
    pub author: u32,
    pub seq: u32,
}

impl StrokeId {
    pub fn new(author: u32, seq: u32) -> Self {
        Self { author, seq }
    }
}

impl fmt::Display for StrokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.author, self.seq)
    }
}

/// A single sample on a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    /// Pen pressure in [0, 1]
    pub pressure: f32,
    /// Milliseconds, non-decreasing within a stroke
    pub timestamp: u64,
}

impl Point {
    pub fn new(x: f32, y: f32, timestamp: u64) -> Self {
        Self {
            x,
            y,
            pressure: 1.0,
            timestamp,
        }
    }

    pub fn with_pressure(mut self, pressure: f32) -> Self {
        self.pressure = pressure.clamp(0.0, 1.0);
        self
    }

    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Linear interpolation of position, pressure and timestamp.
    pub fn lerp(&self, other: &Point, t: f32) -> Point {
        let t = t.clamp(0.0, 1.0);
        let dt = other.timestamp.saturating_sub(self.timestamp) as f64;
        Point {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            pressure: self.pressure + (other.pressure - self.pressure) * t,
            timestamp: self.timestamp + (dt * t as f64).round() as u64,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.pressure.is_finite()
    }
}

/// 24-bit paint color, written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Linear RGBA with the given alpha.
    pub fn to_rgba(self, alpha: f32) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            alpha,
        ]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = PaintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| PaintError::InvalidColor(s.to_string()))?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(PaintError::InvalidColor(s.to_string()));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| PaintError::InvalidColor(s.to_string()))
        };

        Ok(Color::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BrushType {
    #[default]
    Basic,
    Spray,
    Texture,
    Neon,
    Glitch,
    Cyberpunk,
}

impl BrushType {
    pub const ALL: [BrushType; 6] = [
        BrushType::Basic,
        BrushType::Spray,
        BrushType::Texture,
        BrushType::Neon,
        BrushType::Glitch,
        BrushType::Cyberpunk,
    ];

    pub fn next(self) -> BrushType {
        let index = Self::ALL.iter().position(|b| *b == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

/// Everything about a stroke's look that is fixed at stroke start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushStyle {
    pub color: Color,
    pub size: f32,
    pub brush_type: BrushType,
    pub opacity: f32,
}

impl BrushStyle {
    pub fn new(color: Color, size: f32, brush_type: BrushType) -> Self {
        Self {
            color,
            size,
            brush_type,
            opacity: 1.0,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

/// One continuous paint gesture by one author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: StrokeId,
    pub author_id: u32,
    pub points: Vec<Point>,
    pub color: Color,
    pub brush_size: f32,
    pub brush_type: BrushType,
    pub opacity: f32,
    pub created_at: u64,
    pub completed: bool,
}

impl Stroke {
    /// Starts a stroke at `origin`. Size and opacity are clamped into range.
    pub fn new(id: StrokeId, author_id: u32, origin: Point, style: BrushStyle) -> Self {
        let mut stroke = Self::remote(id, author_id, origin, style);
        stroke.brush_size = style.size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
        stroke.opacity = style.opacity.clamp(0.0, 1.0);
        stroke
    }

    /// A stroke announced by a peer, with its style exactly as sent. Run
    /// [`Stroke::validate`] before trusting it.
    pub fn remote(id: StrokeId, author_id: u32, origin: Point, style: BrushStyle) -> Self {
        Self {
            id,
            author_id,
            points: vec![origin],
            color: style.color,
            brush_size: style.size,
            brush_type: style.brush_type,
            opacity: style.opacity,
            created_at: origin.timestamp,
            completed: false,
        }
    }

    pub fn style(&self) -> BrushStyle {
        BrushStyle {
            color: self.color,
            size: self.brush_size,
            brush_type: self.brush_type,
            opacity: self.opacity,
        }
    }

    pub fn last_point(&self) -> Option<&Point> {
        self.points.last()
    }

    /// Appends points, clamping timestamps so they never go backwards.
    pub fn append(&mut self, points: &[Point]) -> Result<(), PaintError> {
        if self.completed {
            return Err(PaintError::StrokeCompleted(self.id));
        }

        let mut last_ts = self.last_point().map_or(0, |p| p.timestamp);
        for point in points {
            let mut point = *point;
            point.timestamp = point.timestamp.max(last_ts);
            last_ts = point.timestamp;
            self.points.push(point);
        }
        Ok(())
    }

    pub fn complete(&mut self) {
        self.completed = true;
    }

    /// Checks the invariants a stroke received from the wire must hold.
    pub fn validate(&self) -> Result<(), PaintError> {
        if self.points.is_empty() {
            return Err(PaintError::MalformedMessage(format!(
                "stroke {} has no points",
                self.id
            )));
        }
        if self.points.len() > MAX_STROKE_POINTS {
            return Err(PaintError::MalformedMessage(format!(
                "stroke {} has {} points",
                self.id,
                self.points.len()
            )));
        }
        if !(self.brush_size > 0.0 && self.brush_size <= MAX_BRUSH_SIZE) {
            return Err(PaintError::MalformedMessage(format!(
                "stroke {} has brush size {}",
                self.id, self.brush_size
            )));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(PaintError::MalformedMessage(format!(
                "stroke {} has opacity {}",
                self.id, self.opacity
            )));
        }
        if self.id.author != self.author_id {
            return Err(PaintError::MalformedMessage(format!(
                "stroke {} claims author {}",
                self.id, self.author_id
            )));
        }
        validate_points(self.id, &self.points)
    }
}

pub const MIN_BRUSH_SIZE: f32 = 0.5;
pub const MAX_BRUSH_SIZE: f32 = 128.0;

/// Finite coordinates and pressure in [0, 1].
pub(crate) fn validate_points(id: StrokeId, points: &[Point]) -> Result<(), PaintError> {
    if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
        return Err(PaintError::MalformedMessage(format!(
            "stroke {} has non-finite point ({}, {})",
            id, bad.x, bad.y
        )));
    }
    if let Some(bad) = points.iter().find(|p| !(0.0..=1.0).contains(&p.pressure)) {
        return Err(PaintError::MalformedMessage(format!(
            "stroke {} has pressure {}",
            id, bad.pressure
        )));
    }
    Ok(())
}
