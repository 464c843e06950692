use crate::game::{ClientGame, ConnectionState};
use macroquad::prelude::*;
use shared::{CanvasSpec, FrameBuffer, RenderPipeline};
use std::time::Instant;

/// Width of the side panel right of the canvas
pub const HUD_WIDTH: f32 = 240.0;

const PANEL: Color = Color::new(0.1, 0.1, 0.13, 1.0);
const DIM: Color = Color::new(0.2, 0.2, 0.2, 1.0);
const TEXT: Color = WHITE;

#[derive(Debug, Clone)]
pub struct HudConfig {
    pub fake_ping_ms: u64,
    pub bot: bool,
}

/// Composites the canvas in software and blits it, then draws the HUD
/// with macroquad shapes.
pub struct Renderer {
    canvas: CanvasSpec,
    pipeline: RenderPipeline,
    frame: FrameBuffer,
    texture: Texture2D,
}

impl Renderer {
    pub fn new(canvas: CanvasSpec) -> Self {
        let (width, height) = frame_size(canvas);
        let frame = FrameBuffer::new(width, height);
        let texture = Texture2D::from_rgba8(width as u16, height as u16, &frame.to_rgba8());
        texture.set_filter(FilterMode::Nearest);

        Self {
            canvas,
            pipeline: RenderPipeline::new(width, height),
            frame,
            texture,
        }
    }

    pub fn window_size(canvas: CanvasSpec) -> (f32, f32) {
        (canvas.width + HUD_WIDTH, canvas.height)
    }

    pub fn toggle_grid(&mut self) {
        self.pipeline.show_grid = !self.pipeline.show_grid;
    }

    pub fn render(&mut self, game: &ClientGame, config: &HudConfig, now: Instant) {
        let canvas = game.session().canvas_spec();
        if canvas != self.canvas {
            let show_grid = self.pipeline.show_grid;
            *self = Self::new(canvas);
            self.pipeline.show_grid = show_grid;
            let (width, height) = Self::window_size(canvas);
            request_new_screen_size(width, height);
        }

        self.pipeline.render_into(
            &mut self.frame,
            &game.session().stroke_snapshot(),
            &game.session().territory_snapshot(),
        );
        self.texture
            .update_from_bytes(self.frame.width, self.frame.height, &self.frame.to_rgba8());

        clear_background(PANEL);
        draw_texture(&self.texture, 0.0, 0.0, WHITE);
        self.draw_hud(game, config, now);
    }

    fn draw_hud(&self, game: &ClientGame, config: &HudConfig, now: Instant) {
        let x = self.canvas.width + 12.0;
        let mut y = 22.0;

        draw_text("PAINT BATTLE", x, y, 22.0, TEXT);
        y += 22.0;

        let (connection_color, connection_text) = match game.connection() {
            ConnectionState::Connected { client_id } => (GREEN, format!("Painter #{}", client_id)),
            ConnectionState::Connecting => (YELLOW, "Connecting...".to_string()),
            ConnectionState::Disconnected { reason } => (RED, reason.clone()),
        };
        draw_rectangle(x, y - 8.0, 8.0, 8.0, connection_color);
        draw_text(&connection_text, x + 14.0, y, 16.0, TEXT);
        y += 16.0;

        let total_ping = game.ping_ms() + config.fake_ping_ms;
        let (bars, bar_color) = ping_bars(total_ping);
        for i in 0..10u32 {
            let color = if i < bars { bar_color } else { DIM };
            draw_rectangle(x + i as f32 * 3.0, y - 8.0, 2.0, 8.0, color);
        }
        draw_text(&format!("{}ms", total_ping), x + 36.0, y, 14.0, TEXT);
        if config.bot {
            draw_text("BOT", x + 100.0, y, 14.0, ORANGE);
        }
        y += 22.0;

        draw_text(
            &format!("Round ends in {}", format_remaining(game.remaining_ms())),
            x,
            y,
            16.0,
            TEXT,
        );
        y += 24.0;

        let style = game.brush_style();
        draw_rectangle(x, y - 12.0, 14.0, 14.0, to_mq_color(style.color, 1.0));
        draw_text(&format!("{:?} brush", style.brush_type), x + 20.0, y, 16.0, TEXT);
        y += 22.0;

        let empty = game.empty_flash(now);
        for (i, level) in game.session().paint_levels().iter().enumerate() {
            let selected = level.color == style.color;
            draw_text(&format!("{}", i + 1), x, y + 2.0, 14.0, if selected { YELLOW } else { TEXT });
            draw_rectangle(x + 14.0, y - 8.0, 150.0, 10.0, DIM);
            draw_rectangle(
                x + 14.0,
                y - 8.0,
                150.0 * level.fraction(),
                10.0,
                to_mq_color(level.color, 1.0),
            );
            if empty == Some(level.color) {
                draw_rectangle_lines(x + 13.0, y - 9.0, 152.0, 12.0, 2.0, RED);
            } else if selected {
                draw_rectangle_lines(x + 13.0, y - 9.0, 152.0, 12.0, 1.0, WHITE);
            }
            y += 16.0;
        }
        y += 12.0;

        draw_text("Standings", x, y, 18.0, TEXT);
        y += 18.0;
        for stats in game.standings().iter().take(8) {
            let marker = if Some(stats.owner_id) == game.client_id() { " (you)" } else { "" };
            draw_rectangle(x, y - 10.0, 10.0, 10.0, to_mq_color(stats.color, 1.0));
            draw_text(
                &format!(
                    "#{}{}  {:.2} / {} cells",
                    stats.owner_id, marker, stats.total_coverage, stats.cells
                ),
                x + 16.0,
                y,
                14.0,
                TEXT,
            );
            y += 16.0;
        }

        if let Some(result) = game.last_round() {
            y += 10.0;
            let text = match result.winner {
                Some(winner) => format!("Round {} won by #{}", result.round, winner),
                None => format!("Round {} had no winner", result.round),
            };
            draw_text(&text, x, y, 16.0, GOLD);
        }

        let help_y = self.canvas.height - 12.0;
        draw_text("1-6 color  B brush  C clear", x, help_y - 16.0, 14.0, LIGHTGRAY);
        draw_text("R resync  G grid  Esc quit", x, help_y, 14.0, LIGHTGRAY);
    }
}

fn frame_size(canvas: CanvasSpec) -> (u32, u32) {
    (
        canvas.width.max(1.0) as u32,
        canvas.height.max(1.0) as u32,
    )
}

pub fn to_mq_color(color: shared::Color, alpha: f32) -> Color {
    let [r, g, b, a] = color.to_rgba(alpha);
    Color::new(r, g, b, a)
}

/// `m:ss`
pub fn format_remaining(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Bar count out of ten and the color for a round trip time.
pub fn ping_bars(total_ping: u64) -> (u32, Color) {
    let bars = (total_ping / 20).min(10) as u32;
    let color = if total_ping < 50 {
        GREEN
    } else if total_ping < 100 {
        YELLOW
    } else {
        RED
    };
    (bars, color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(0), "0:00");
        assert_eq!(format_remaining(5_999), "0:05");
        assert_eq!(format_remaining(90_000), "1:30");
    }

    #[test]
    fn test_ping_bars() {
        assert_eq!(ping_bars(0).0, 0);
        assert_eq!(ping_bars(45), (2, GREEN));
        assert_eq!(ping_bars(80), (4, YELLOW));
        assert_eq!(ping_bars(5000), (10, RED));
    }

    #[test]
    fn test_color_conversion() {
        let color = to_mq_color(shared::Color::rgb(255, 0, 51), 0.5);
        assert_approx_eq!(color.r, 1.0);
        assert_approx_eq!(color.g, 0.0);
        assert_approx_eq!(color.b, 0.2);
        assert_approx_eq!(color.a, 0.5);
    }

    #[test]
    fn test_window_fits_canvas_and_hud() {
        let canvas = CanvasSpec {
            width: 800.0,
            height: 600.0,
            cell_size: 32.0,
        };
        assert_eq!(Renderer::window_size(canvas), (800.0 + HUD_WIDTH, 600.0));
        assert_eq!(frame_size(canvas), (800, 600));
    }
}
