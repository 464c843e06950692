//! The room: an observer copy of the canvas plus the round clock.

use log::{debug, info};
use shared::{
    Applied, Canvas, CanvasSpec, OwnerStats, Packet, PaintConfig, PaintError, StrokeId,
    SyncProtocol, SNAPSHOT_CELLS_PER_PACKET,
};
use std::time::{Duration, Instant};

pub struct PaintRoom {
    canvas: Canvas,
    sync: SyncProtocol,
    round_duration: Duration,
    round_started: Instant,
    pub round: u32,
    pub tick: u32,
}

impl PaintRoom {
    pub fn new(config: &PaintConfig, round_duration: Duration, now: Instant) -> Self {
        Self {
            canvas: Canvas::from_config(config),
            sync: SyncProtocol::new(),
            round_duration,
            round_started: now,
            round: 1,
            tick: 0,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn canvas_spec(&self) -> CanvasSpec {
        self.canvas.spec()
    }

    /// Applies an accepted stroke or clear message to the observer canvas.
    pub fn apply(&mut self, packet: Packet) -> Result<Applied, PaintError> {
        self.sync.apply_inbound(&mut self.canvas, packet)
    }

    pub fn clear(&mut self) {
        self.canvas.clear();
    }

    /// Completes every stroke a departed participant left live and returns
    /// the end messages the remaining participants need.
    pub fn close_strokes_of(&mut self, author: u32) -> Vec<Packet> {
        let open: Vec<StrokeId> = self
            .canvas
            .store()
            .strokes()
            .filter(|stroke| stroke.author_id == author && !stroke.completed)
            .map(|stroke| stroke.id)
            .collect();

        let mut ends = Vec::new();
        for id in open {
            let Some(mut stroke) = self.canvas.store().get(id).cloned() else {
                continue;
            };
            stroke.complete();
            let end = Packet::stroke_end(&stroke);
            match self.apply(end.clone()) {
                Ok(_) => ends.push(end),
                Err(e) => debug!("Could not close stroke {}: {}", id, e),
            }
        }
        ends
    }

    /// Packets that rebuild this canvas on a participant: a begin marker,
    /// every stroke in paint order, then the territory grid in chunks with
    /// the last chunk riding on the end marker. Each packet fits a datagram.
    pub fn snapshot_packets(&self) -> Vec<Packet> {
        let strokes = self.canvas.store().snapshot();
        let mut packets = Vec::with_capacity(strokes.len() + 2);
        packets.push(Packet::SnapshotBegin {
            stroke_count: strokes.len() as u32,
        });

        for stroke in &strokes {
            if stroke.completed {
                packets.push(Packet::stroke_end(stroke));
            } else {
                packets.push(Packet::stroke_start(stroke));
                if stroke.points.len() > 1 {
                    packets.push(Packet::StrokeUpdate {
                        stroke_id: stroke.id,
                        new_points: stroke.points[1..].to_vec(),
                    });
                }
            }
        }

        let mut cells = self.canvas.territory_snapshot().cells;
        let tail_start = cells.len().saturating_sub(1) / SNAPSHOT_CELLS_PER_PACKET
            * SNAPSHOT_CELLS_PER_PACKET;
        let tail = cells.split_off(tail_start);
        for chunk in cells.chunks(SNAPSHOT_CELLS_PER_PACKET) {
            packets.push(Packet::SnapshotCells {
                cells: chunk.to_vec(),
            });
        }
        packets.push(Packet::SnapshotEnd { cells: tail });
        packets
    }

    pub fn standings(&self) -> Vec<OwnerStats> {
        self.canvas.territory().stats_by_owner()
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.round_duration
            .saturating_sub(now.saturating_duration_since(self.round_started))
    }

    pub fn is_round_over(&self, now: Instant) -> bool {
        self.remaining(now).is_zero()
    }

    pub fn scoreboard(&self, now: Instant) -> Packet {
        Packet::Scoreboard {
            standings: self.standings(),
            remaining_ms: self.remaining(now).as_millis() as u64,
        }
    }

    /// Closes the round: final standings out, canvas wiped, clock restarted.
    pub fn finish_round(&mut self, now: Instant) -> Packet {
        let standings = self.standings();
        let winner = standings.first().map(|s| s.owner_id);
        info!(
            "Round {} over, winner {:?} with {} participants scored",
            self.round,
            winner,
            standings.len()
        );

        self.canvas.clear();
        self.round += 1;
        self.round_started = now;

        Packet::RoundOver { standings, winner }
    }
}
