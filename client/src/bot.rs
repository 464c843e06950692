//! Random-walk painter that drives the game through the same pointer calls
//! a person would.

use crate::game::ClientGame;
use crate::input::PointerEvent;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const STEP_LENGTH: f32 = 6.0;
const MAX_TURN: f32 = 0.45;

pub struct Bot {
    rng: StdRng,
    drawing: bool,
    x: f32,
    y: f32,
    heading: f32,
    steps_left: u32,
    pause_frames: u32,
}

impl Bot {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            drawing: false,
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            steps_left: 0,
            pause_frames: 0,
        }
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Advances the walk by one frame.
    pub fn step(&mut self, game: &mut ClientGame, now_ms: u64) {
        if game.client_id().is_none() {
            self.drawing = false;
            return;
        }

        if !self.drawing {
            if self.pause_frames > 0 {
                self.pause_frames -= 1;
                return;
            }
            self.start_stroke(game, now_ms);
            return;
        }

        // Ran dry or the canvas was cleared under us
        if game.active_stroke().is_none() || self.steps_left == 0 {
            self.end_stroke(game, now_ms);
            return;
        }

        let spec = game.session().canvas_spec();
        self.heading += self.rng.gen_range(-MAX_TURN..MAX_TURN);
        let mut x = self.x + self.heading.cos() * STEP_LENGTH;
        let mut y = self.y + self.heading.sin() * STEP_LENGTH;

        if x < 0.0 || x >= spec.width {
            self.heading = std::f32::consts::PI - self.heading;
            x = x.clamp(0.0, spec.width - 1.0);
        }
        if y < 0.0 || y >= spec.height {
            self.heading = -self.heading;
            y = y.clamp(0.0, spec.height - 1.0);
        }

        self.x = x;
        self.y = y;
        self.steps_left -= 1;
        game.handle_pointer(PointerEvent::Move { x, y }, now_ms);
    }

    fn start_stroke(&mut self, game: &mut ClientGame, now_ms: u64) {
        let palette_len = game.session().config().palette.len();
        if palette_len > 0 && self.rng.gen_bool(0.3) {
            game.select_color(self.rng.gen_range(0..palette_len));
        }
        if self.rng.gen_bool(0.1) {
            game.cycle_brush();
        }

        let spec = game.session().canvas_spec();
        self.x = self.rng.gen_range(0.0..spec.width);
        self.y = self.rng.gen_range(0.0..spec.height);
        self.heading = self.rng.gen_range(0.0..std::f32::consts::TAU);
        self.steps_left = self.rng.gen_range(20..80);

        game.handle_pointer(
            PointerEvent::Down {
                x: self.x,
                y: self.y,
            },
            now_ms,
        );
        self.drawing = game.active_stroke().is_some();
        if !self.drawing {
            self.pause_frames = self.rng.gen_range(30..90);
        }
    }

    fn end_stroke(&mut self, game: &mut ClientGame, now_ms: u64) {
        game.handle_pointer(PointerEvent::Up, now_ms);
        self.drawing = false;
        self.pause_frames = self.rng.gen_range(10..40);
    }
}

impl Default for Bot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{CanvasSpec, Packet, PaintConfig};
    use std::time::Instant;

    fn connected_game() -> ClientGame {
        let now = Instant::now();
        let mut game = ClientGame::new(PaintConfig::default(), now);
        game.handle_packet(
            Packet::Connected {
                client_id: 3,
                canvas: CanvasSpec::from(&PaintConfig::default()),
            },
            now,
            0,
        );
        let cells = game.session().territory_snapshot().cells;
        game.handle_packet(Packet::SnapshotBegin { stroke_count: 0 }, now, 0);
        game.handle_packet(Packet::SnapshotEnd { cells }, now, 0);
        game.drain_outbound();
        game
    }

    fn run(bot: &mut Bot, game: &mut ClientGame, frames: u64) -> Vec<Packet> {
        let start = Instant::now();
        let mut packets = Vec::new();
        for frame in 0..frames {
            let now_ms = frame * 16;
            bot.step(game, now_ms);
            game.tick(start, now_ms);
            packets.extend(game.drain_outbound());
        }
        packets
    }

    #[test]
    fn test_bot_paints_inside_canvas() {
        let mut game = connected_game();
        let mut bot = Bot::from_seed(7);

        run(&mut bot, &mut game, 600);

        let store = game.session().canvas().store();
        assert!(store.completed().count() >= 1);
        for stroke in store.strokes() {
            assert_eq!(stroke.author_id, 3);
            for point in &stroke.points {
                assert!(point.x >= 0.0 && point.x < 800.0);
                assert!(point.y >= 0.0 && point.y < 600.0);
            }
        }
        assert!(!game.session().stats_by_owner().is_empty());
    }

    #[test]
    fn test_same_seed_same_strokes() {
        let mut game_a = connected_game();
        let mut game_b = connected_game();

        let a = run(&mut Bot::from_seed(11), &mut game_a, 300);
        let b = run(&mut Bot::from_seed(11), &mut game_b, 300);

        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_bot_idles_while_disconnected() {
        let mut game = ClientGame::new(PaintConfig::default(), Instant::now());
        let mut bot = Bot::from_seed(1);
        bot.step(&mut game, 0);
        assert!(!bot.is_drawing());
        assert!(game.session().canvas().store().is_empty());
    }
}
