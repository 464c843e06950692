//! Client-side paint state: the local session, connection lifecycle and
//! everything the HUD shows.

use crate::input::{ControlAction, PointerEvent};
use log::{debug, info, warn};
use shared::{
    Applied, BrushStyle, BrushType, Color, OwnerStats, Packet, PaintConfig, PaintEvent,
    PaintEventKind, PaintSession, Point, StrokeId, PROTOCOL_VERSION,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Silence after which the client reconnects
pub const SERVER_TIMEOUT: Duration = Duration::from_secs(5);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_BRUSH_SIZE: f32 = 8.0;
const EMPTY_FLASH: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected { client_id: u32 },
    Disconnected { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundResult {
    pub round: u32,
    pub winner: Option<u32>,
    pub standings: Vec<OwnerStats>,
}

pub struct ClientGame {
    session: PaintSession,
    connection: ConnectionState,
    control: Vec<Packet>,

    color_index: usize,
    brush_type: BrushType,
    brush_size: f32,
    active_stroke: Option<StrokeId>,

    last_heard: Instant,
    last_heartbeat: Instant,
    last_connect_attempt: Instant,
    /// Set while a requested snapshot has not finished arriving
    snapshot_requested: Option<Instant>,
    ping_ms: u64,

    standings: Vec<OwnerStats>,
    remaining_ms: u64,
    rounds_seen: u32,
    last_round: Option<RoundResult>,

    paint_empty: mpsc::UnboundedReceiver<PaintEvent>,
    empty_flash: Option<(Color, Instant)>,
}

impl ClientGame {
    /// Starts unbound (participant 0) with a connect request queued.
    pub fn new(config: PaintConfig, now: Instant) -> Self {
        let mut session = PaintSession::new(0, &config);
        let paint_empty = session.subscribe(PaintEventKind::PaintEmpty);

        Self {
            session,
            connection: ConnectionState::Connecting,
            control: vec![Self::connect_packet()],
            color_index: 0,
            brush_type: BrushType::Basic,
            brush_size: DEFAULT_BRUSH_SIZE,
            active_stroke: None,
            last_heard: now,
            last_heartbeat: now,
            last_connect_attempt: now,
            snapshot_requested: None,
            ping_ms: 0,
            standings: Vec::new(),
            remaining_ms: 0,
            rounds_seen: 0,
            last_round: None,
            paint_empty,
            empty_flash: None,
        }
    }

    fn connect_packet() -> Packet {
        Packet::Connect {
            client_version: PROTOCOL_VERSION,
        }
    }

    pub fn session(&self) -> &PaintSession {
        &self.session
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn client_id(&self) -> Option<u32> {
        match self.connection {
            ConnectionState::Connected { client_id } => Some(client_id),
            _ => None,
        }
    }

    /// Waiting on a snapshot; drawing is held back until it lands since
    /// the replay replaces the canvas.
    pub fn is_syncing(&self) -> bool {
        self.snapshot_requested.is_some()
    }

    pub fn ping_ms(&self) -> u64 {
        self.ping_ms
    }

    pub fn standings(&self) -> &[OwnerStats] {
        &self.standings
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn last_round(&self) -> Option<&RoundResult> {
        self.last_round.as_ref()
    }

    pub fn active_stroke(&self) -> Option<StrokeId> {
        self.active_stroke
    }

    pub fn color(&self) -> Color {
        let palette = &self.session.config().palette;
        palette
            .get(self.color_index)
            .or_else(|| palette.first())
            .copied()
            .unwrap_or(Color::rgb(255, 255, 255))
    }

    pub fn brush_type(&self) -> BrushType {
        self.brush_type
    }

    pub fn brush_style(&self) -> BrushStyle {
        BrushStyle::new(self.color(), self.brush_size, self.brush_type)
    }

    /// Color whose bucket ran dry recently, for the HUD.
    pub fn empty_flash(&self, now: Instant) -> Option<Color> {
        self.empty_flash
            .filter(|(_, at)| now.saturating_duration_since(*at) < EMPTY_FLASH)
            .map(|(color, _)| color)
    }

    /// Processes one packet from the server.
    pub fn handle_packet(&mut self, packet: Packet, now: Instant, now_ms: u64) {
        self.last_heard = now;

        match packet {
            Packet::Connected { client_id, canvas } => {
                if let Err(e) = canvas.validate() {
                    warn!("Server announced an unusable canvas: {}", e);
                    self.session.abandon_live_strokes();
                    self.active_stroke = None;
                    self.snapshot_requested = None;
                    self.connection = ConnectionState::Disconnected {
                        reason: e.to_string(),
                    };
                    return;
                }
                info!("Connected! Client ID: {}", client_id);
                self.active_stroke = None;

                if canvas != self.session.canvas_spec() {
                    info!(
                        "Server canvas is {}x{} with {} px cells",
                        canvas.width, canvas.height, canvas.cell_size
                    );
                    let config = self.session.config().clone().with_canvas(canvas);
                    self.session = PaintSession::new(client_id, &config);
                    self.paint_empty = self.session.subscribe(PaintEventKind::PaintEmpty);
                } else {
                    self.session.rebind(client_id);
                }

                self.connection = ConnectionState::Connected { client_id };
                self.last_heartbeat = now;
                self.request_snapshot(now);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.session.abandon_live_strokes();
                self.active_stroke = None;
                self.snapshot_requested = None;
                self.connection = ConnectionState::Disconnected { reason };
            }

            Packet::HeartbeatAck { timestamp } => {
                self.ping_ms = now_ms.saturating_sub(timestamp);
            }

            Packet::Scoreboard {
                standings,
                remaining_ms,
            } => {
                self.standings = standings;
                self.remaining_ms = remaining_ms;
            }

            Packet::RoundOver { standings, winner } => {
                self.rounds_seen += 1;
                info!("Round {} over, winner: {:?}", self.rounds_seen, winner);
                self.standings.clear();
                self.last_round = Some(RoundResult {
                    round: self.rounds_seen,
                    winner,
                    standings,
                });
            }

            packet => match self.session.apply_remote(packet) {
                Ok(Applied::Cleared | Applied::SnapshotStarted) => self.active_stroke = None,
                Ok(Applied::SnapshotRestored { strokes }) => {
                    info!("Canvas restored with {} strokes", strokes);
                    self.snapshot_requested = None;
                }
                _ => {}
            },
        }
    }

    /// Once-per-frame housekeeping: bucket refill, heartbeats and reconnects.
    pub fn tick(&mut self, now: Instant, now_ms: u64) {
        self.session.refill_tick(now_ms);

        while let Ok(event) = self.paint_empty.try_recv() {
            if let PaintEvent::PaintEmpty { color } = event {
                self.empty_flash = Some((color, now));
            }
        }

        let silence = now.saturating_duration_since(self.last_heard);
        if silence >= SERVER_TIMEOUT
            && now.saturating_duration_since(self.last_connect_attempt) >= SERVER_TIMEOUT
        {
            warn!(
                "No word from server for {:.1}s, reconnecting",
                silence.as_secs_f32()
            );
            self.reconnect(now);
            return;
        }

        if self.client_id().is_none() {
            return;
        }

        if now.saturating_duration_since(self.last_heartbeat) >= HEARTBEAT_INTERVAL {
            self.last_heartbeat = now;
            self.control.push(Packet::Heartbeat { timestamp: now_ms });
        }

        // Part of the snapshot went missing
        if let Some(requested) = self.snapshot_requested {
            if now.saturating_duration_since(requested) >= SERVER_TIMEOUT {
                warn!("Snapshot did not arrive, asking again");
                self.request_snapshot(now);
            }
        }
    }

    fn request_snapshot(&mut self, now: Instant) {
        self.active_stroke = None;
        self.snapshot_requested = Some(now);
        self.session.request_resync();
    }

    /// Drops the current binding and asks the server for a new one. The
    /// snapshot that follows the new `Connected` restores the canvas.
    pub fn reconnect(&mut self, now: Instant) {
        self.session.abandon_live_strokes();
        self.active_stroke = None;
        self.snapshot_requested = None;
        self.connection = ConnectionState::Connecting;
        self.last_connect_attempt = now;
        self.control.push(Self::connect_packet());
    }

    pub fn handle_pointer(&mut self, event: PointerEvent, now_ms: u64) {
        let Some(client_id) = self.client_id() else {
            return;
        };

        match event {
            PointerEvent::Down { x, y } => {
                if let Some(id) = self.active_stroke.take() {
                    self.finish_active(id);
                }
                if self.is_syncing() {
                    return;
                }
                match self.session.begin_stroke(
                    client_id,
                    Point::new(x, y, now_ms),
                    self.brush_style(),
                ) {
                    Ok(stroke) => self.active_stroke = Some(stroke.id),
                    Err(e) => debug!("Could not begin stroke: {}", e),
                }
            }
            PointerEvent::Move { x, y } => {
                let Some(id) = self.active_stroke else {
                    return;
                };
                if let Err(e) = self.session.extend_stroke(id, Point::new(x, y, now_ms)) {
                    debug!("Stroke {} stopped: {}", id, e);
                    self.active_stroke = None;
                }
            }
            PointerEvent::Up | PointerEvent::Left => {
                if let Some(id) = self.active_stroke.take() {
                    self.finish_active(id);
                }
            }
        }
    }

    fn finish_active(&mut self, id: StrokeId) {
        if let Err(e) = self.session.finish_stroke(id) {
            debug!("Could not finish stroke {}: {}", id, e);
        }
    }

    /// Out-of-range indices are ignored.
    pub fn select_color(&mut self, index: usize) {
        if index < self.session.config().palette.len() {
            self.color_index = index;
            debug!("Selected color {}", self.color());
        }
    }

    pub fn cycle_brush(&mut self) {
        self.brush_type = self.brush_type.next();
        debug!("Selected brush {:?}", self.brush_type);
    }

    /// Applies a key action. Grid toggling belongs to the renderer and is
    /// ignored here.
    pub fn handle_control(&mut self, action: ControlAction, now: Instant) {
        match action {
            ControlAction::SelectColor(index) => self.select_color(index),
            ControlAction::CycleBrush => self.cycle_brush(),
            ControlAction::ClearCanvas => {
                if self.client_id().is_some() {
                    info!("Clearing canvas");
                    self.active_stroke = None;
                    self.session.clear_canvas();
                }
            }
            ControlAction::Resync => {
                if self.client_id().is_some() {
                    info!("Requesting canvas snapshot");
                    self.request_snapshot(now);
                }
            }
            ControlAction::ToggleGrid => {}
        }
    }

    /// Packets for the network: control traffic first, then session
    /// traffic, which only goes out while bound to a participant id.
    pub fn drain_outbound(&mut self) -> Vec<Packet> {
        let mut packets = std::mem::take(&mut self.control);
        let session_packets = self.session.drain_outbound();

        if self.client_id().is_some() {
            packets.extend(session_packets);
        } else if !session_packets.is_empty() {
            debug!(
                "Discarding {} packets while not connected",
                session_packets.len()
            );
        }
        packets
    }

    /// Final packets to send on the way out.
    pub fn shutdown(&mut self) -> Vec<Packet> {
        self.session.abandon_live_strokes();
        self.active_stroke = None;
        let mut packets = self.drain_outbound();
        if self.client_id().is_some() {
            packets.push(Packet::Disconnect);
        }
        packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{CanvasSpec, Stroke, StrokePhase};

    fn spec() -> CanvasSpec {
        CanvasSpec::from(&PaintConfig::default())
    }

    fn finish_snapshot(game: &mut ClientGame, now: Instant) {
        let cells = game.session().territory_snapshot().cells;
        game.handle_packet(Packet::SnapshotBegin { stroke_count: 0 }, now, 0);
        game.handle_packet(Packet::SnapshotEnd { cells }, now, 0);
    }

    fn connected(client_id: u32, now: Instant) -> ClientGame {
        let mut game = ClientGame::new(PaintConfig::default(), now);
        game.handle_packet(
            Packet::Connected {
                client_id,
                canvas: spec(),
            },
            now,
            0,
        );
        finish_snapshot(&mut game, now);
        game.drain_outbound();
        game
    }

    fn draw_line(game: &mut ClientGame, from: (f32, f32), to: (f32, f32), now_ms: u64) {
        game.handle_pointer(PointerEvent::Down { x: from.0, y: from.1 }, now_ms);
        game.handle_pointer(PointerEvent::Move { x: to.0, y: to.1 }, now_ms + 10);
        game.handle_pointer(PointerEvent::Up, now_ms + 20);
    }

    #[test]
    fn test_new_game_queues_connect() {
        let mut game = ClientGame::new(PaintConfig::default(), Instant::now());
        assert_eq!(game.connection(), &ConnectionState::Connecting);
        assert_eq!(
            game.drain_outbound(),
            vec![Packet::Connect {
                client_version: PROTOCOL_VERSION
            }]
        );
        assert!(game.drain_outbound().is_empty());
    }

    #[test]
    fn test_connected_binds_and_requests_snapshot() {
        let now = Instant::now();
        let mut game = ClientGame::new(PaintConfig::default(), now);
        game.drain_outbound();

        game.handle_packet(
            Packet::Connected {
                client_id: 4,
                canvas: spec(),
            },
            now,
            0,
        );

        assert_eq!(game.client_id(), Some(4));
        assert_eq!(game.session().participant_id(), 4);
        assert!(game.is_syncing());
        assert_eq!(game.drain_outbound(), vec![Packet::SnapshotRequest]);

        // No drawing until the snapshot lands
        game.handle_pointer(PointerEvent::Down { x: 5.0, y: 5.0 }, 10);
        assert!(game.active_stroke().is_none());

        finish_snapshot(&mut game, now);
        assert!(!game.is_syncing());
        game.handle_pointer(PointerEvent::Down { x: 5.0, y: 5.0 }, 20);
        assert!(game.active_stroke().is_some());
    }

    #[test]
    fn test_lost_snapshot_is_requested_again() {
        let start = Instant::now();
        let mut game = ClientGame::new(PaintConfig::default(), start);
        game.handle_packet(
            Packet::Connected {
                client_id: 2,
                canvas: spec(),
            },
            start,
            0,
        );
        game.drain_outbound();

        // Heartbeats keep the link alive but the snapshot never comes
        let later = start + SERVER_TIMEOUT;
        game.handle_packet(Packet::HeartbeatAck { timestamp: 0 }, later, 5000);
        game.tick(later, 5000);

        let packets = game.drain_outbound();
        assert!(packets.contains(&Packet::SnapshotRequest));
        assert!(game.is_syncing());
    }

    #[test]
    fn test_server_canvas_geometry_is_adopted() {
        let now = Instant::now();
        let mut game = ClientGame::new(PaintConfig::default(), now);
        let small = CanvasSpec {
            width: 320.0,
            height: 240.0,
            cell_size: 16.0,
        };

        game.handle_packet(
            Packet::Connected {
                client_id: 1,
                canvas: small,
            },
            now,
            0,
        );

        assert_eq!(game.session().canvas_spec(), small);
        assert_eq!(game.session().canvas().territory().cols(), 20);
    }

    #[test]
    fn test_pointer_draws_and_queues_sync() {
        let now = Instant::now();
        let mut game = connected(2, now);

        draw_line(&mut game, (5.0, 5.0), (25.0, 5.0), 1000);

        assert!(game.active_stroke().is_none());
        let packets = game.drain_outbound();
        assert!(matches!(packets.first(), Some(Packet::StrokeStart { .. })));
        assert!(matches!(packets.last(), Some(Packet::StrokeEnd { .. })));
        assert_eq!(packets.iter().filter(|p| p.stroke_author() == Some(2)).count(), packets.len());

        let cell = game.session().canvas().territory().cell(0, 0).unwrap();
        assert_eq!(cell.owner_id, Some(2));
    }

    #[test]
    fn test_pointer_ignored_while_connecting() {
        let mut game = ClientGame::new(PaintConfig::default(), Instant::now());
        draw_line(&mut game, (5.0, 5.0), (25.0, 5.0), 1000);
        assert!(game.session().canvas().store().is_empty());
    }

    #[test]
    fn test_leaving_canvas_finishes_stroke() {
        let now = Instant::now();
        let mut game = connected(1, now);
        game.handle_pointer(PointerEvent::Down { x: 100.0, y: 100.0 }, 10);
        let id = game.active_stroke().unwrap();

        game.handle_pointer(PointerEvent::Left, 20);

        assert!(game.active_stroke().is_none());
        assert_eq!(game.session().canvas().phase(id), Some(StrokePhase::Completed));
    }

    #[test]
    fn test_controls() {
        let now = Instant::now();
        let mut game = connected(1, now);
        let palette = PaintConfig::default().palette;

        game.handle_control(ControlAction::SelectColor(3), now);
        assert_eq!(game.color(), palette[3]);
        game.handle_control(ControlAction::SelectColor(42), now);
        assert_eq!(game.color(), palette[3]);

        game.handle_control(ControlAction::CycleBrush, now);
        assert_eq!(game.brush_type(), BrushType::Spray);

        draw_line(&mut game, (5.0, 5.0), (25.0, 5.0), 1000);
        game.drain_outbound();
        game.handle_control(ControlAction::ClearCanvas, now);
        assert!(game.session().canvas().store().is_empty());
        assert_eq!(game.drain_outbound(), vec![Packet::CanvasClear]);

        game.handle_control(ControlAction::Resync, now);
        assert_eq!(game.drain_outbound(), vec![Packet::SnapshotRequest]);
    }

    #[test]
    fn test_heartbeat_and_ping() {
        let start = Instant::now();
        let mut game = connected(1, start);

        game.tick(start + Duration::from_millis(500), 500);
        assert!(game.drain_outbound().is_empty());

        game.tick(start + Duration::from_millis(1000), 1000);
        assert_eq!(
            game.drain_outbound(),
            vec![Packet::Heartbeat { timestamp: 1000 }]
        );

        game.handle_packet(
            Packet::HeartbeatAck { timestamp: 1000 },
            start + Duration::from_millis(1040),
            1040,
        );
        assert_eq!(game.ping_ms(), 40);
    }

    #[test]
    fn test_silence_triggers_reconnect() {
        let start = Instant::now();
        let mut game = connected(1, start);
        game.handle_pointer(PointerEvent::Down { x: 10.0, y: 10.0 }, 10);

        let later = start + SERVER_TIMEOUT + Duration::from_millis(10);
        game.tick(later, 6000);

        assert_eq!(game.connection(), &ConnectionState::Connecting);
        assert!(game.active_stroke().is_none());
        let packets = game.drain_outbound();
        assert_eq!(
            packets,
            vec![Packet::Connect {
                client_version: PROTOCOL_VERSION
            }]
        );

        // No second attempt until another timeout passes
        game.tick(later + Duration::from_secs(1), 7000);
        assert!(game.drain_outbound().is_empty());
        game.tick(later + SERVER_TIMEOUT, 12000);
        assert_eq!(game.drain_outbound().len(), 1);
    }

    #[test]
    fn test_reconnect_rebinds_and_resyncs() {
        let start = Instant::now();
        let mut game = connected(1, start);
        draw_line(&mut game, (5.0, 5.0), (25.0, 5.0), 1000);
        game.reconnect(start);
        game.drain_outbound();

        game.handle_packet(
            Packet::Connected {
                client_id: 9,
                canvas: spec(),
            },
            start,
            2000,
        );
        assert_eq!(game.session().participant_id(), 9);
        assert_eq!(game.drain_outbound(), vec![Packet::SnapshotRequest]);

        finish_snapshot(&mut game, start);
        assert!(!game.is_syncing());
        assert!(game.session().canvas().store().is_empty());
    }

    #[test]
    fn test_rebind_sends_nothing_under_old_id() {
        let start = Instant::now();
        let mut game = connected(1, start);
        game.handle_pointer(PointerEvent::Down { x: 10.0, y: 10.0 }, 1000);
        game.handle_pointer(PointerEvent::Move { x: 60.0, y: 10.0 }, 1010);
        game.reconnect(start);

        game.handle_packet(
            Packet::Connected {
                client_id: 9,
                canvas: spec(),
            },
            start,
            2000,
        );

        let packets = game.drain_outbound();
        assert!(packets.iter().all(|p| p.stroke_author() != Some(1)));
        assert!(packets.contains(&Packet::SnapshotRequest));
    }

    #[test]
    fn test_unusable_canvas_is_refused() {
        let now = Instant::now();
        let mut game = ClientGame::new(PaintConfig::default(), now);
        game.drain_outbound();

        game.handle_packet(
            Packet::Connected {
                client_id: 3,
                canvas: CanvasSpec {
                    width: 100_000.0,
                    height: 600.0,
                    cell_size: 1.0,
                },
            },
            now,
            0,
        );

        assert!(matches!(
            game.connection(),
            ConnectionState::Disconnected { .. }
        ));
        assert_eq!(game.client_id(), None);
        assert!(game.drain_outbound().is_empty());
    }

    #[test]
    fn test_remote_strokes_and_clear() {
        let now = Instant::now();
        let mut game = connected(1, now);
        game.handle_pointer(PointerEvent::Down { x: 10.0, y: 10.0 }, 10);

        let mut remote = Stroke::new(
            StrokeId::new(5, 1),
            5,
            Point::new(300.0, 300.0, 5),
            BrushStyle::new(Color::rgb(0, 0, 255), 4.0, BrushType::Neon),
        );
        remote.complete();
        game.handle_packet(Packet::stroke_end(&remote), now, 20);
        assert_eq!(game.session().canvas().store().len(), 2);

        game.handle_packet(Packet::CanvasClear, now, 30);
        assert!(game.session().canvas().store().is_empty());
        assert!(game.active_stroke().is_none());
    }

    #[test]
    fn test_scoreboard_and_round_over() {
        let now = Instant::now();
        let mut game = connected(1, now);
        let standings = vec![OwnerStats {
            owner_id: 1,
            total_coverage: 0.5,
            color: Color::rgb(255, 0, 0),
            cells: 3,
        }];

        game.handle_packet(
            Packet::Scoreboard {
                standings: standings.clone(),
                remaining_ms: 1500,
            },
            now,
            0,
        );
        assert_eq!(game.standings(), standings.as_slice());
        assert_eq!(game.remaining_ms(), 1500);

        game.handle_packet(
            Packet::RoundOver {
                standings: standings.clone(),
                winner: Some(1),
            },
            now,
            0,
        );
        let result = game.last_round().unwrap();
        assert_eq!(result.round, 1);
        assert_eq!(result.winner, Some(1));
        assert!(game.standings().is_empty());
    }

    #[test]
    fn test_empty_bucket_flashes() {
        let now = Instant::now();
        let mut game = connected(1, now);
        let color = game.color();
        game.session
            .ledger_mut()
            .bucket_mut(color)
            .unwrap()
            .set_volume(0.0);

        game.handle_pointer(PointerEvent::Down { x: 10.0, y: 10.0 }, 0);
        game.tick(now, 0);

        assert!(game.active_stroke().is_none());
        assert_eq!(game.empty_flash(now), Some(game.color()));
        assert_eq!(game.empty_flash(now + Duration::from_secs(2)), None);
    }

    #[test]
    fn test_disconnected_and_shutdown() {
        let now = Instant::now();
        let mut game = connected(1, now);
        game.handle_pointer(PointerEvent::Down { x: 10.0, y: 10.0 }, 10);
        let packets = game.shutdown();
        assert!(matches!(packets.last(), Some(Packet::Disconnect)));
        assert!(packets
            .iter()
            .any(|p| matches!(p, Packet::StrokeEnd { .. })));

        game.handle_packet(
            Packet::Disconnected {
                reason: "Server full".to_string(),
            },
            now,
            0,
        );
        assert_eq!(
            game.connection(),
            &ConnectionState::Disconnected {
                reason: "Server full".to_string()
            }
        );
        assert!(game.shutdown().is_empty());
    }
}
