//! Software compositor producing one RGBA frame per call.
//!
//! Layers, back to front: background and grid, completed strokes, live
//! remote strokes, live local strokes, territory overlay, effects. The
//! pipeline only reads engine state.

use crate::store::StrokeSnapshot;
use crate::stroke::{BrushType, Color, Point, Stroke};
use crate::territory::TerritorySnapshot;
use crate::OVERLAY_ALPHA;

pub type Rgba = [f32; 4];

const BACKGROUND: Rgba = [0.07, 0.07, 0.1, 1.0];
const GRID_LINE: Rgba = [1.0, 1.0, 1.0, 1.0];
const GRID_OPACITY: f32 = 0.08;
const SPRAY_DOTS: u64 = 6;
/// Upper bound on dabs between two stroke points
const MAX_DABS_PER_SEGMENT: usize = 1024;

/// Row-major RGBA float pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pixels: Vec<Rgba>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0, 0.0, 0.0, 0.0]; width as usize * height as usize],
        }
    }

    pub fn clear(&mut self, color: Rgba) {
        self.pixels.fill(color);
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// `out = src * a + dst * (1 - a)` with `a = color alpha * opacity`.
    #[inline]
    pub fn blend_pixel(&mut self, x: u32, y: u32, color: Rgba, opacity: f32) {
        let Some(index) = self.index(x, y) else {
            return;
        };
        let dst = self.pixels[index];
        let alpha = (color[3] * opacity).clamp(0.0, 1.0);
        let inv = 1.0 - alpha;

        self.pixels[index] = [
            color[0] * alpha + dst[0] * inv,
            color[1] * alpha + dst[1] * inv,
            color[2] * alpha + dst[2] * inv,
            alpha + dst[3] * inv,
        ];
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba, opacity: f32) {
        let Some((x0, y0, x1, y1)) = self.clip(x, y, x + width, y + height) else {
            return;
        };
        for py in y0..y1 {
            for px in x0..x1 {
                self.blend_pixel(px, py, color, opacity);
            }
        }
    }

    /// Hard-edged circular stamp.
    pub fn stamp_dab(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba, opacity: f32) {
        if radius <= 0.0 || opacity <= 0.0 {
            return;
        }
        // Sub-pixel dabs still cover the pixel they land in
        let radius = radius.max(0.5);
        let Some((x0, y0, x1, y1)) = self.clip(cx - radius, cy - radius, cx + radius, cy + radius)
        else {
            return;
        };

        let r_sq = radius * radius;
        for py in y0..y1 {
            for px in x0..x1 {
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r_sq {
                    self.blend_pixel(px, py, color, opacity);
                }
            }
        }
    }

    fn clip(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> Option<(u32, u32, u32, u32)> {
        let x0 = (x0.floor().max(0.0) as u32).min(self.width);
        let y0 = (y0.floor().max(0.0) as u32).min(self.height);
        let x1 = (x1.ceil().max(0.0) as u32).min(self.width);
        let y1 = (y1.ceil().max(0.0) as u32).min(self.height);
        if x0 >= x1 || y0 >= y1 {
            None
        } else {
            Some((x0, y0, x1, y1))
        }
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    /// 8-bit RGBA, ready for texture upload.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|p| p.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }
}

/// Cosmetic layer drawn last, after the territory overlay.
pub trait EffectsRenderer {
    fn render_effects(
        &self,
        frame: &mut FrameBuffer,
        strokes: &StrokeSnapshot,
        territory: &TerritorySnapshot,
    );
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoEffects;

impl EffectsRenderer for NoEffects {
    fn render_effects(&self, _: &mut FrameBuffer, _: &StrokeSnapshot, _: &TerritorySnapshot) {}
}

pub struct RenderPipeline {
    width: u32,
    height: u32,
    pub show_grid: bool,
    pub show_territory: bool,
    effects: Box<dyn EffectsRenderer + Send>,
}

impl RenderPipeline {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            show_grid: true,
            show_territory: true,
            effects: Box::new(NoEffects),
        }
    }

    pub fn with_effects(mut self, effects: Box<dyn EffectsRenderer + Send>) -> Self {
        self.effects = effects;
        self
    }

    pub fn render_frame(
        &self,
        strokes: &StrokeSnapshot,
        territory: &TerritorySnapshot,
    ) -> FrameBuffer {
        let mut frame = FrameBuffer::new(self.width, self.height);
        self.render_into(&mut frame, strokes, territory);
        frame
    }

    /// Redraws every layer into an existing frame of the same size.
    pub fn render_into(
        &self,
        frame: &mut FrameBuffer,
        strokes: &StrokeSnapshot,
        territory: &TerritorySnapshot,
    ) {
        frame.clear(BACKGROUND);
        if self.show_grid {
            draw_grid(frame, territory);
        }

        for stroke in strokes
            .completed
            .iter()
            .chain(&strokes.live_remote)
            .chain(&strokes.live_local)
        {
            draw_stroke(frame, stroke);
        }

        if self.show_territory {
            draw_territory(frame, territory);
        }

        self.effects.render_effects(frame, strokes, territory);
    }
}

fn draw_grid(frame: &mut FrameBuffer, territory: &TerritorySnapshot) {
    let size = territory.cell_size;
    for col in 1..territory.cols {
        frame.fill_rect(col as f32 * size, 0.0, 1.0, frame.height as f32, GRID_LINE, GRID_OPACITY);
    }
    for row in 1..territory.rows {
        frame.fill_rect(0.0, row as f32 * size, frame.width as f32, 1.0, GRID_LINE, GRID_OPACITY);
    }
}

fn draw_territory(frame: &mut FrameBuffer, territory: &TerritorySnapshot) {
    for cell in &territory.cells {
        let Some(color) = cell.dominant_color else {
            continue;
        };
        if cell.owner_id.is_none() || cell.paint_coverage <= 0.0 {
            continue;
        }
        frame.fill_rect(
            cell.x,
            cell.y,
            cell.width,
            cell.height,
            color.to_rgba(1.0),
            cell.paint_coverage * OVERLAY_ALPHA,
        );
    }
}

fn draw_stroke(frame: &mut FrameBuffer, stroke: &Stroke) {
    let base = stroke.color.to_rgba(1.0);
    let Some(first) = stroke.points.first() else {
        return;
    };

    let mut dab_index: u64 = 0;
    let mut prev = *first;
    draw_dab(frame, stroke, &prev, base, dab_index);

    for point in &stroke.points[1..] {
        let radius = stroke.brush_size * 0.5;
        let spacing = (radius * 0.5).max(1.0);
        let steps = dab_steps(prev.distance_to(point), spacing);

        for step in 1..=steps {
            dab_index += 1;
            let at = prev.lerp(point, step as f32 / steps as f32);
            draw_dab(frame, stroke, &at, base, dab_index);
        }
        prev = *point;
    }
}

/// Dabs needed to cover `distance` at `spacing`, capped so a single wild
/// segment cannot stall a frame.
fn dab_steps(distance: f32, spacing: f32) -> usize {
    let steps = (distance / spacing).ceil();
    if steps.is_nan() || steps < 1.0 {
        1
    } else {
        (steps as usize).min(MAX_DABS_PER_SEGMENT)
    }
}

fn draw_dab(frame: &mut FrameBuffer, stroke: &Stroke, at: &Point, base: Rgba, index: u64) {
    let radius = stroke.brush_size * 0.5 * at.pressure;
    let opacity = stroke.opacity;
    let seed = hash_seed(stroke, index);

    match stroke.brush_type {
        BrushType::Basic => frame.stamp_dab(at.x, at.y, radius, base, opacity),
        BrushType::Spray => {
            for dot in 0..SPRAY_DOTS {
                let angle = unit(seed, dot * 2) * std::f32::consts::TAU;
                let reach = unit(seed, dot * 2 + 1) * radius * 1.5;
                frame.stamp_dab(
                    at.x + angle.cos() * reach,
                    at.y + angle.sin() * reach,
                    (radius * 0.2).max(0.5),
                    base,
                    opacity,
                );
            }
        }
        BrushType::Texture => {
            let grain = 0.6 + 0.4 * unit(seed, 0);
            frame.stamp_dab(at.x, at.y, radius, base, opacity * grain);
        }
        BrushType::Neon => {
            frame.stamp_dab(at.x, at.y, radius * 1.8, base, opacity * 0.15);
            frame.stamp_dab(at.x, at.y, radius, base, opacity);
            frame.stamp_dab(at.x, at.y, radius * 0.4, lighten(base, 0.7), opacity);
        }
        BrushType::Glitch => {
            let shift = if unit(seed, 0) > 0.8 {
                (unit(seed, 1) - 0.5) * radius * 4.0
            } else {
                0.0
            };
            frame.stamp_dab(at.x + shift, at.y, radius, base, opacity);
        }
        BrushType::Cyberpunk => {
            let edge = Color::rgb(0, 255, 255).to_rgba(1.0);
            frame.stamp_dab(at.x + radius * 0.3, at.y, radius, edge, opacity * 0.5);
            frame.stamp_dab(at.x, at.y, radius, base, opacity);
        }
    }
}

fn lighten(color: Rgba, amount: f32) -> Rgba {
    [
        color[0] + (1.0 - color[0]) * amount,
        color[1] + (1.0 - color[1]) * amount,
        color[2] + (1.0 - color[2]) * amount,
        color[3],
    ]
}

fn hash_seed(stroke: &Stroke, index: u64) -> u64 {
    ((stroke.id.author as u64) << 48) ^ ((stroke.id.seq as u64) << 24) ^ index
}

/// Deterministic value in [0, 1) from a seed and a lane (splitmix64).
fn unit(seed: u64, lane: u64) -> f32 {
    let mut z = seed
        .wrapping_add(lane.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 40) as f32 / (1u64 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{BrushStyle, StrokeId};
    use crate::territory::TerritoryGrid;
    use assert_approx_eq::assert_approx_eq;

    fn dot(author: u32, x: f32, y: f32, color: Color, brush_type: BrushType) -> Stroke {
        Stroke::new(
            StrokeId::new(author, 1),
            author,
            Point::new(x, y, 1),
            BrushStyle::new(color, 10.0, brush_type),
        )
    }

    fn empty_territory() -> TerritorySnapshot {
        TerritoryGrid::new(64.0, 64.0, 32.0).snapshot()
    }

    fn pipeline() -> RenderPipeline {
        let mut pipeline = RenderPipeline::new(64, 64);
        pipeline.show_grid = false;
        pipeline
    }

    #[test]
    fn test_blend_pixel() {
        let mut frame = FrameBuffer::new(4, 4);
        frame.clear([1.0, 1.0, 1.0, 1.0]);
        frame.blend_pixel(1, 1, [1.0, 0.0, 0.0, 1.0], 0.5);

        let p = frame.get_pixel(1, 1).unwrap();
        assert_approx_eq!(p[0], 1.0);
        assert_approx_eq!(p[1], 0.5);
        assert_approx_eq!(p[2], 0.5);
        assert_eq!(frame.get_pixel(9, 9), None);
    }

    #[test]
    fn test_to_rgba8() {
        let mut frame = FrameBuffer::new(2, 1);
        frame.clear([1.0, 0.0, 0.5, 1.0]);
        assert_eq!(frame.to_rgba8(), vec![255, 0, 128, 255, 255, 0, 128, 255]);
    }

    #[test]
    fn test_local_live_strokes_draw_over_completed() {
        let red = Color::rgb(255, 0, 0);
        let blue = Color::rgb(0, 0, 255);
        let green = Color::rgb(0, 255, 0);

        let mut completed = dot(1, 20.0, 20.0, red, BrushType::Basic);
        completed.complete();
        let snapshot = StrokeSnapshot {
            completed: vec![completed],
            live_remote: vec![dot(2, 20.0, 20.0, green, BrushType::Basic)],
            live_local: vec![dot(3, 20.0, 20.0, blue, BrushType::Basic)],
        };

        let frame = pipeline().render_frame(&snapshot, &empty_territory());
        assert_eq!(frame.get_pixel(20, 20), Some(blue.to_rgba(1.0)));

        let snapshot = StrokeSnapshot {
            live_local: vec![],
            ..snapshot
        };
        let frame = pipeline().render_frame(&snapshot, &empty_territory());
        assert_eq!(frame.get_pixel(20, 20), Some(green.to_rgba(1.0)));
    }

    #[test]
    fn test_territory_overlay_sits_above_strokes() {
        let red = Color::rgb(255, 0, 0);
        let mut grid = TerritoryGrid::new(64.0, 64.0, 32.0);
        let mut stroke = dot(1, 10.0, 10.0, Color::rgb(0, 0, 255), BrushType::Basic);
        let points: Vec<Point> = (0..100).map(|i| Point::new(10.0, 10.0, i)).collect();
        stroke.append(&points).unwrap();

        let owner = dot(2, 5.0, 5.0, red, BrushType::Basic);
        grid.touch(&owner, &points);

        let snapshot = StrokeSnapshot {
            completed: vec![stroke],
            ..Default::default()
        };
        let frame = pipeline().render_frame(&snapshot, &grid.snapshot());

        // Full coverage: blue under a red tint at OVERLAY_ALPHA
        let p = frame.get_pixel(10, 10).unwrap();
        assert_approx_eq!(p[0], OVERLAY_ALPHA, 1e-4);
        assert_approx_eq!(p[2], 1.0 - OVERLAY_ALPHA, 1e-4);

        // Unowned cell shows background only
        assert_eq!(frame.get_pixel(50, 50), Some(BACKGROUND));
    }

    struct Marker;

    impl EffectsRenderer for Marker {
        fn render_effects(&self, frame: &mut FrameBuffer, _: &StrokeSnapshot, _: &TerritorySnapshot) {
            frame.blend_pixel(0, 0, [1.0, 1.0, 0.0, 1.0], 1.0);
        }
    }

    #[test]
    fn test_effects_draw_last() {
        let pipeline = pipeline().with_effects(Box::new(Marker));
        let snapshot = StrokeSnapshot {
            completed: vec![dot(1, 0.0, 0.0, Color::rgb(255, 0, 0), BrushType::Basic)],
            ..Default::default()
        };
        let frame = pipeline.render_frame(&snapshot, &empty_territory());
        assert_eq!(frame.get_pixel(0, 0), Some([1.0, 1.0, 0.0, 1.0]));
    }

    #[test]
    fn test_spray_is_deterministic() {
        let mut stroke = dot(4, 30.0, 30.0, Color::rgb(255, 0, 255), BrushType::Spray);
        stroke
            .append(&[Point::new(40.0, 35.0, 2), Point::new(50.0, 30.0, 3)])
            .unwrap();
        let snapshot = StrokeSnapshot {
            live_remote: vec![stroke],
            ..Default::default()
        };

        let a = pipeline().render_frame(&snapshot, &empty_territory());
        let b = pipeline().render_frame(&snapshot, &empty_territory());
        assert_eq!(a, b);
        assert!(a.pixels().iter().any(|p| *p != BACKGROUND));
    }

    #[test]
    fn test_grid_lines_drawn_when_enabled() {
        let mut pipeline = RenderPipeline::new(64, 64);
        let frame = pipeline.render_frame(&StrokeSnapshot::default(), &empty_territory());
        assert_ne!(frame.get_pixel(32, 10), Some(BACKGROUND));

        pipeline.show_grid = false;
        let frame = pipeline.render_frame(&StrokeSnapshot::default(), &empty_territory());
        assert_eq!(frame.get_pixel(32, 10), Some(BACKGROUND));
    }

    #[test]
    fn test_unit_range() {
        for lane in 0..1000 {
            let v = unit(12345, lane);
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_dab_steps_are_capped() {
        assert_eq!(dab_steps(0.0, 2.0), 1);
        assert_eq!(dab_steps(10.0, 2.0), 5);
        assert_eq!(dab_steps(10.5, 2.0), 6);
        assert_eq!(dab_steps(1.0e12, 1.0), MAX_DABS_PER_SEGMENT);
        assert_eq!(dab_steps(f32::INFINITY, 1.0), MAX_DABS_PER_SEGMENT);
    }

    #[test]
    fn test_far_off_segment_leaves_frame_untouched() {
        let mut stroke = dot(5, 1.0e7, 1.0e7, Color::rgb(0, 255, 0), BrushType::Basic);
        stroke
            .append(&[Point::new(-1.0e7, 1.0e7, 2)])
            .unwrap();
        let snapshot = StrokeSnapshot {
            completed: vec![stroke],
            ..Default::default()
        };

        let frame = pipeline().render_frame(&snapshot, &empty_territory());
        assert!(frame.pixels().iter().all(|p| *p == BACKGROUND));
    }
}
