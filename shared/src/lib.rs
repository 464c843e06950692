pub mod canvas;
pub mod capture;
pub mod error;
pub mod events;
pub mod ledger;
pub mod protocol;
pub mod render;
pub mod session;
pub mod store;
pub mod stroke;
pub mod sync;
pub mod territory;

pub use canvas::Canvas;
pub use capture::{Extension, StrokeCapture};
pub use error::PaintError;
pub use events::{EventBus, PaintEvent, PaintEventKind};
pub use ledger::{BucketLevel, PaintBucket, PaintLedger};
pub use protocol::{CanvasSpec, Packet, PROTOCOL_VERSION};
pub use render::{EffectsRenderer, FrameBuffer, NoEffects, RenderPipeline};
pub use session::PaintSession;
pub use store::{Ownership, StrokePhase, StrokeSnapshot, StrokeStore};
pub use stroke::{BrushStyle, BrushType, Color, Point, Stroke, StrokeId};
pub use sync::{Applied, SyncProtocol};
pub use territory::{CanvasArea, OwnerStats, TerritoryGrid, TerritorySnapshot};

use std::time::{SystemTime, UNIX_EPOCH};

pub const CANVAS_WIDTH: f32 = 800.0;
pub const CANVAS_HEIGHT: f32 = 600.0;
pub const CELL_SIZE: f32 = 32.0;

pub const COVERAGE_INCREMENT: f32 = 0.01;
/// Cells at or below this coverage do not count towards standings
pub const COVERAGE_NOISE_THRESHOLD: f32 = 0.1;
pub const OVERLAY_ALPHA: f32 = 0.35;

pub const PAINT_COST_PER_UNIT: f32 = 0.1;
pub const MIN_PAINT_TO_BEGIN: f32 = 1.0;
pub const BUCKET_MAX_VOLUME: f32 = 100.0;
/// Units per second
pub const BUCKET_REFILL_RATE: f32 = 8.0;

/// Largest payload a single UDP datagram can carry over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65507;
/// Points one stroke may hold; a full stroke's end message stays well
/// inside a datagram. Longer gestures continue as a new stroke.
pub const MAX_STROKE_POINTS: usize = 2048;
/// Territory cells per snapshot packet
pub const SNAPSHOT_CELLS_PER_PACKET: usize = 512;
/// Largest grid a room can announce
pub const MAX_GRID_CELLS: usize = 65_536;
pub const MAX_CANVAS_DIMENSION: f32 = 4096.0;
pub const MIN_CELL_SIZE: f32 = 4.0;

pub const DEFAULT_PALETTE: [Color; 6] = [
    Color::rgb(0xff, 0x00, 0x00),
    Color::rgb(0x00, 0xff, 0x88),
    Color::rgb(0x00, 0x88, 0xff),
    Color::rgb(0xff, 0xdd, 0x00),
    Color::rgb(0xff, 0x00, 0xff),
    Color::rgb(0x00, 0xff, 0xff),
];

/// Canvas geometry, palette and bucket parameters shared by every
/// participant in a room.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintConfig {
    pub width: f32,
    pub height: f32,
    pub cell_size: f32,
    pub palette: Vec<Color>,
    pub bucket_max_volume: f32,
    pub bucket_refill_rate: f32,
}

impl Default for PaintConfig {
    fn default() -> Self {
        Self {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            cell_size: CELL_SIZE,
            palette: DEFAULT_PALETTE.to_vec(),
            bucket_max_volume: BUCKET_MAX_VOLUME,
            bucket_refill_rate: BUCKET_REFILL_RATE,
        }
    }
}

impl PaintConfig {
    /// Same palette and buckets on the geometry the server announced.
    pub fn with_canvas(mut self, canvas: CanvasSpec) -> Self {
        self.width = canvas.width;
        self.height = canvas.height;
        self.cell_size = canvas.cell_size;
        self
    }
}

/// Milliseconds since the Unix epoch.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
