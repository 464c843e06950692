//! Outbound queueing and inbound merge of stroke messages.
//!
//! Each stroke id moves `NONE -> LIVE_LOCAL -> COMPLETED` when authored
//! here, or `NONE -> LIVE_REMOTE -> COMPLETED` when it arrives from the
//! network. There is no global sequence counter: a missed start is repaired
//! by the authoritative full point list in the end message, a missed update
//! stays missing until then, and duplicates or late messages are dropped.

use crate::canvas::Canvas;
use crate::error::PaintError;
use crate::protocol::Packet;
use crate::store::StrokePhase;
use crate::stroke::{validate_points, BrushStyle, Point, Stroke, StrokeId};
use crate::territory::CanvasArea;
use crate::MAX_STROKE_POINTS;
use log::{debug, info};
use std::collections::VecDeque;

/// What an inbound packet did to the canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    StrokeStarted {
        id: StrokeId,
        author_id: u32,
        changed: Vec<CanvasArea>,
    },
    StrokeExtended {
        id: StrokeId,
        changed: Vec<CanvasArea>,
    },
    StrokeCompleted {
        stroke: Stroke,
        changed: Vec<CanvasArea>,
    },
    Cleared,
    SnapshotStarted,
    /// A chunk of snapshot territory was held for the end of the restore
    SnapshotStaged {
        cells: usize,
    },
    SnapshotRestored {
        strokes: usize,
    },
    /// Duplicate or late message, dropped
    Ignored,
    /// Not a canvas message
    Unhandled,
}

#[derive(Debug, Clone, Default)]
pub struct SyncProtocol {
    outbound: VecDeque<Packet>,
}

impl SyncProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    pub fn queue_start(&mut self, stroke: &Stroke) {
        self.outbound.push_back(Packet::stroke_start(stroke));
    }

    /// Queues a point delta, merging it into the previous update when that
    /// update is for the same stroke and has not been drained yet.
    pub fn queue_update(&mut self, id: StrokeId, points: &[Point]) {
        if points.is_empty() {
            return;
        }

        if let Some(Packet::StrokeUpdate {
            stroke_id,
            new_points,
        }) = self.outbound.back_mut()
        {
            if *stroke_id == id && new_points.len() + points.len() <= MAX_STROKE_POINTS {
                new_points.extend_from_slice(points);
                return;
            }
        }

        self.outbound.push_back(Packet::StrokeUpdate {
            stroke_id: id,
            new_points: points.to_vec(),
        });
    }

    /// Drops queued stroke traffic written under `author`. Returns how many
    /// packets went.
    pub fn discard_from(&mut self, author: u32) -> usize {
        let before = self.outbound.len();
        self.outbound
            .retain(|packet| packet.stroke_author() != Some(author));
        before - self.outbound.len()
    }

    pub fn queue_end(&mut self, stroke: &Stroke) {
        self.outbound.push_back(Packet::stroke_end(stroke));
    }

    pub fn queue_clear(&mut self) {
        self.outbound.push_back(Packet::CanvasClear);
    }

    pub fn queue_snapshot_request(&mut self) {
        self.outbound.push_back(Packet::SnapshotRequest);
    }

    /// Everything queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<Packet> {
        self.outbound.drain(..).collect()
    }

    /// Merges one message from the network into the canvas.
    pub fn apply_inbound(
        &mut self,
        canvas: &mut Canvas,
        packet: Packet,
    ) -> Result<Applied, PaintError> {
        match packet {
            Packet::StrokeStart {
                stroke_id,
                author_id,
                color,
                brush_size,
                brush_type,
                opacity,
                first_point,
            } => {
                let style = BrushStyle::new(color, brush_size, brush_type).with_opacity(opacity);
                let stroke = Stroke::remote(stroke_id, author_id, first_point, style);
                stroke.validate()?;
                canvas.check_within(stroke_id, &stroke.points, brush_size)?;

                match canvas.start_remote(stroke)? {
                    Some(changed) => Ok(Applied::StrokeStarted {
                        id: stroke_id,
                        author_id,
                        changed,
                    }),
                    None => {
                        debug!("Ignoring duplicate start for stroke {}", stroke_id);
                        Ok(Applied::Ignored)
                    }
                }
            }

            Packet::StrokeUpdate {
                stroke_id,
                new_points,
            } => {
                validate_points(stroke_id, &new_points)?;
                match canvas.phase(stroke_id) {
                    None => Err(PaintError::UnknownStroke(stroke_id)),
                    Some(StrokePhase::Completed) => {
                        debug!("Ignoring late update for completed stroke {}", stroke_id);
                        Ok(Applied::Ignored)
                    }
                    Some(_) => {
                        let margin = canvas
                            .store()
                            .get(stroke_id)
                            .map_or(0.0, |stroke| stroke.brush_size);
                        canvas.check_within(stroke_id, &new_points, margin)?;
                        let changed = canvas.extend_remote(stroke_id, &new_points)?;
                        Ok(Applied::StrokeExtended {
                            id: stroke_id,
                            changed,
                        })
                    }
                }
            }

            Packet::StrokeEnd {
                stroke_id,
                final_stroke,
            } => {
                if final_stroke.id != stroke_id {
                    return Err(PaintError::MalformedMessage(format!(
                        "end for {} carries stroke {}",
                        stroke_id, final_stroke.id
                    )));
                }
                final_stroke.validate()?;
                canvas.check_within(stroke_id, &final_stroke.points, final_stroke.brush_size)?;

                if canvas.phase(stroke_id) == Some(StrokePhase::Completed) {
                    debug!("Ignoring duplicate end for stroke {}", stroke_id);
                    return Ok(Applied::Ignored);
                }

                let changed = canvas.finish_remote(stroke_id, final_stroke)?;
                let stroke = canvas
                    .store()
                    .get(stroke_id)
                    .cloned()
                    .ok_or(PaintError::UnknownStroke(stroke_id))?;
                Ok(Applied::StrokeCompleted { stroke, changed })
            }

            Packet::CanvasClear => {
                canvas.clear();
                Ok(Applied::Cleared)
            }

            Packet::SnapshotBegin { stroke_count } => {
                info!("Restoring canvas snapshot of {} strokes", stroke_count);
                canvas.begin_restore();
                Ok(Applied::SnapshotStarted)
            }

            Packet::SnapshotCells { cells } => {
                if !canvas.is_restoring() {
                    debug!("Ignoring snapshot cells outside a restore");
                    return Ok(Applied::Ignored);
                }
                let count = cells.len();
                canvas.stage_cells(cells)?;
                Ok(Applied::SnapshotStaged { cells: count })
            }

            Packet::SnapshotEnd { cells } => {
                canvas.finish_restore(cells)?;
                Ok(Applied::SnapshotRestored {
                    strokes: canvas.store().len(),
                })
            }

            _ => Ok(Applied::Unhandled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CanvasSpec;
    use crate::stroke::{BrushType, Color};
    use assert_approx_eq::assert_approx_eq;

    const RED: Color = Color::rgb(255, 0, 0);

    fn canvas() -> Canvas {
        Canvas::new(CanvasSpec {
            width: 256.0,
            height: 256.0,
            cell_size: 32.0,
        })
    }

    fn remote_stroke(author: u32, seq: u32, points: &[(f32, f32, u64)]) -> Stroke {
        let (x, y, t) = points[0];
        let mut stroke = Stroke::new(
            StrokeId::new(author, seq),
            author,
            Point::new(x, y, t),
            BrushStyle::new(RED, 6.0, BrushType::Basic),
        );
        let rest: Vec<Point> = points[1..]
            .iter()
            .map(|(x, y, t)| Point::new(*x, *y, *t))
            .collect();
        stroke.append(&rest).unwrap();
        stroke.complete();
        stroke
    }

    #[test]
    fn test_outbound_coalesces_updates() {
        let mut sync = SyncProtocol::new();
        let stroke = remote_stroke(1, 1, &[(0.0, 0.0, 0)]);
        let other = StrokeId::new(1, 2);

        sync.queue_start(&stroke);
        sync.queue_update(stroke.id, &[Point::new(1.0, 0.0, 1)]);
        sync.queue_update(stroke.id, &[Point::new(2.0, 0.0, 2), Point::new(3.0, 0.0, 3)]);
        sync.queue_update(other, &[Point::new(9.0, 9.0, 4)]);
        sync.queue_update(stroke.id, &[]);
        sync.queue_end(&stroke);

        let packets = sync.drain();
        assert_eq!(packets.len(), 4);
        match &packets[1] {
            Packet::StrokeUpdate { new_points, .. } => assert_eq!(new_points.len(), 3),
            other => panic!("Unexpected packet {:?}", other),
        }
        assert!(matches!(packets[3], Packet::StrokeEnd { .. }));
        assert_eq!(sync.pending(), 0);
    }

    #[test]
    fn test_start_update_end_flow() {
        let mut sync = SyncProtocol::new();
        let mut canvas = canvas();
        let full = remote_stroke(2, 1, &[(1.0, 1.0, 1), (2.0, 2.0, 2), (40.0, 2.0, 3)]);

        let applied = sync
            .apply_inbound(&mut canvas, Packet::stroke_start(&full))
            .unwrap();
        assert!(matches!(applied, Applied::StrokeStarted { author_id: 2, .. }));
        assert_eq!(canvas.phase(full.id), Some(StrokePhase::LiveRemote));

        sync.apply_inbound(
            &mut canvas,
            Packet::StrokeUpdate {
                stroke_id: full.id,
                new_points: full.points[1..2].to_vec(),
            },
        )
        .unwrap();

        match sync.apply_inbound(&mut canvas, Packet::stroke_end(&full)).unwrap() {
            Applied::StrokeCompleted { stroke, changed } => {
                assert_eq!(stroke, full);
                assert_eq!(changed.len(), 1);
                assert_eq!(changed[0].grid_x, 1);
            }
            other => panic!("Unexpected result {:?}", other),
        }
        assert_approx_eq!(canvas.territory().cell(0, 0).unwrap().paint_coverage, 0.02);
    }

    #[test]
    fn test_end_without_start_adds_stroke() {
        let mut sync = SyncProtocol::new();
        let mut canvas = canvas();
        let full = remote_stroke(3, 1, &[(1.0, 1.0, 1), (2.0, 2.0, 2), (3.0, 3.0, 3)]);

        sync.apply_inbound(&mut canvas, Packet::stroke_end(&full)).unwrap();

        assert_eq!(canvas.store().get(full.id), Some(&full));
        assert_eq!(canvas.territory().cell(0, 0).unwrap().owner_id, Some(3));
        assert_approx_eq!(canvas.territory().cell(0, 0).unwrap().paint_coverage, 0.03);
    }

    #[test]
    fn test_unknown_update_is_noop() {
        let mut sync = SyncProtocol::new();
        let mut canvas = canvas();
        let id = StrokeId::new(5, 1);

        let result = sync.apply_inbound(
            &mut canvas,
            Packet::StrokeUpdate {
                stroke_id: id,
                new_points: vec![Point::new(1.0, 1.0, 1)],
            },
        );
        assert_eq!(result, Err(PaintError::UnknownStroke(id)));
        assert!(canvas.store().is_empty());
    }

    #[test]
    fn test_duplicates_and_late_messages_ignored() {
        let mut sync = SyncProtocol::new();
        let mut canvas = canvas();
        let full = remote_stroke(2, 1, &[(1.0, 1.0, 1), (2.0, 2.0, 2)]);

        sync.apply_inbound(&mut canvas, Packet::stroke_start(&full)).unwrap();
        assert_eq!(
            sync.apply_inbound(&mut canvas, Packet::stroke_start(&full)),
            Ok(Applied::Ignored)
        );

        sync.apply_inbound(&mut canvas, Packet::stroke_end(&full)).unwrap();
        let coverage = canvas.territory().cell(0, 0).unwrap().paint_coverage;

        assert_eq!(
            sync.apply_inbound(&mut canvas, Packet::stroke_end(&full)),
            Ok(Applied::Ignored)
        );
        assert_eq!(
            sync.apply_inbound(
                &mut canvas,
                Packet::StrokeUpdate {
                    stroke_id: full.id,
                    new_points: vec![Point::new(3.0, 3.0, 3)],
                }
            ),
            Ok(Applied::Ignored)
        );
        assert_eq!(canvas.territory().cell(0, 0).unwrap().paint_coverage, coverage);
        assert_eq!(canvas.store().get(full.id).unwrap().points.len(), 2);
    }

    #[test]
    fn test_malformed_messages_rejected() {
        let mut sync = SyncProtocol::new();
        let mut canvas = canvas();
        let full = remote_stroke(2, 1, &[(1.0, 1.0, 1)]);

        let bad_size = Packet::StrokeStart {
            stroke_id: full.id,
            author_id: 2,
            color: RED,
            brush_size: 0.0,
            brush_type: BrushType::Basic,
            opacity: 1.0,
            first_point: Point::new(1.0, 1.0, 1),
        };
        let bad_opacity = Packet::StrokeStart {
            stroke_id: full.id,
            author_id: 2,
            color: RED,
            brush_size: 3.0,
            brush_type: BrushType::Basic,
            opacity: 1.5,
            first_point: Point::new(1.0, 1.0, 1),
        };
        let bad_point = Packet::StrokeStart {
            stroke_id: full.id,
            author_id: 2,
            color: RED,
            brush_size: 3.0,
            brush_type: BrushType::Basic,
            opacity: 1.0,
            first_point: Point::new(f32::INFINITY, 1.0, 1),
        };
        let mismatched = Packet::StrokeEnd {
            stroke_id: StrokeId::new(2, 9),
            final_stroke: full.clone(),
        };
        let mut empty = full.clone();
        empty.points.clear();

        for packet in [bad_size, bad_opacity, bad_point, mismatched, Packet::stroke_end(&empty)] {
            assert!(matches!(
                sync.apply_inbound(&mut canvas, packet),
                Err(PaintError::MalformedMessage(_))
            ));
        }
        assert!(canvas.store().is_empty());
    }

    #[test]
    fn test_pressure_out_of_range_rejected() {
        let mut sync = SyncProtocol::new();
        let mut canvas = canvas();
        let full = remote_stroke(2, 1, &[(1.0, 1.0, 1)]);

        let mut heavy = Point::new(1.0, 1.0, 1);
        heavy.pressure = 50.0;
        let start = Packet::StrokeStart {
            stroke_id: full.id,
            author_id: 2,
            color: RED,
            brush_size: 3.0,
            brush_type: BrushType::Basic,
            opacity: 1.0,
            first_point: heavy,
        };
        assert!(matches!(
            sync.apply_inbound(&mut canvas, start),
            Err(PaintError::MalformedMessage(_))
        ));

        sync.apply_inbound(&mut canvas, Packet::stroke_start(&full)).unwrap();
        let mut negative = Point::new(2.0, 2.0, 2);
        negative.pressure = -1.0;
        let update = Packet::StrokeUpdate {
            stroke_id: full.id,
            new_points: vec![negative],
        };
        assert!(matches!(
            sync.apply_inbound(&mut canvas, update),
            Err(PaintError::MalformedMessage(_))
        ));
        assert_eq!(canvas.store().get(full.id).unwrap().points.len(), 1);
    }

    #[test]
    fn test_off_canvas_points_rejected() {
        let mut sync = SyncProtocol::new();
        let mut canvas = canvas();

        let far = remote_stroke(2, 1, &[(2.0e7, 1.0, 1)]);
        assert!(matches!(
            sync.apply_inbound(&mut canvas, Packet::stroke_start(&far)),
            Err(PaintError::MalformedMessage(_))
        ));
        let far_end = remote_stroke(2, 2, &[(1.0, 1.0, 1), (1.0, -500.0, 2)]);
        assert!(matches!(
            sync.apply_inbound(&mut canvas, Packet::stroke_end(&far_end)),
            Err(PaintError::MalformedMessage(_))
        ));

        let edge = remote_stroke(2, 3, &[(1.0, 1.0, 1)]);
        sync.apply_inbound(&mut canvas, Packet::stroke_start(&edge)).unwrap();
        // Brush size 6 lets a dab hang just past the edge
        let ok = Packet::StrokeUpdate {
            stroke_id: edge.id,
            new_points: vec![Point::new(260.0, -4.0, 2)],
        };
        assert!(matches!(
            sync.apply_inbound(&mut canvas, ok),
            Ok(Applied::StrokeExtended { .. })
        ));
        let off = Packet::StrokeUpdate {
            stroke_id: edge.id,
            new_points: vec![Point::new(300.0, 10.0, 3)],
        };
        assert!(matches!(
            sync.apply_inbound(&mut canvas, off),
            Err(PaintError::MalformedMessage(_))
        ));

        assert!(canvas.store().get(far.id).is_none());
        assert!(canvas.store().get(far_end.id).is_none());
        assert_eq!(canvas.store().get(edge.id).unwrap().points.len(), 2);
    }

    #[test]
    fn test_remote_brush_size_kept_as_sent() {
        let mut sync = SyncProtocol::new();
        let mut canvas = canvas();
        let mut fine = Stroke::remote(
            StrokeId::new(2, 1),
            2,
            Point::new(1.0, 1.0, 1),
            BrushStyle::new(RED, 6.0, BrushType::Basic),
        );
        fine.brush_size = 0.1;
        fine.append(&[Point::new(2.0, 2.0, 2)]).unwrap();
        fine.complete();

        sync.apply_inbound(&mut canvas, Packet::stroke_start(&fine)).unwrap();
        assert_approx_eq!(canvas.store().get(fine.id).unwrap().brush_size, 0.1);

        match sync.apply_inbound(&mut canvas, Packet::stroke_end(&fine)).unwrap() {
            Applied::StrokeCompleted { stroke, .. } => assert_eq!(stroke, fine),
            other => panic!("Unexpected result {:?}", other),
        }
        assert_eq!(canvas.store().get(fine.id), Some(&fine));
    }

    #[test]
    fn test_coalescing_stops_at_stroke_capacity() {
        let mut sync = SyncProtocol::new();
        let id = StrokeId::new(1, 1);
        let batch: Vec<Point> = (0..MAX_STROKE_POINTS as u64 / 2 + 1)
            .map(|i| Point::new(1.0, 1.0, i))
            .collect();

        sync.queue_update(id, &batch);
        sync.queue_update(id, &batch);

        let packets = sync.drain();
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|packet| matches!(
            packet,
            Packet::StrokeUpdate { new_points, .. } if new_points.len() <= MAX_STROKE_POINTS
        )));
    }

    #[test]
    fn test_clear_resets_canvas() {
        let mut sync = SyncProtocol::new();
        let mut canvas = canvas();
        let full = remote_stroke(2, 1, &[(1.0, 1.0, 1), (100.0, 100.0, 2)]);
        sync.apply_inbound(&mut canvas, Packet::stroke_end(&full)).unwrap();

        assert_eq!(
            sync.apply_inbound(&mut canvas, Packet::CanvasClear),
            Ok(Applied::Cleared)
        );
        assert!(canvas.store().is_empty());
        assert!(canvas
            .territory()
            .cells()
            .iter()
            .all(|c| c.paint_coverage == 0.0 && c.owner_id.is_none()));
    }

    #[test]
    fn test_snapshot_replay() {
        let mut source = canvas();
        let mut sync = SyncProtocol::new();
        let a = remote_stroke(2, 1, &[(1.0, 1.0, 1), (2.0, 2.0, 2)]);
        let b = remote_stroke(3, 1, &[(50.0, 50.0, 3)]);
        sync.apply_inbound(&mut source, Packet::stroke_end(&a)).unwrap();
        sync.apply_inbound(&mut source, Packet::stroke_end(&b)).unwrap();

        let mut target = canvas();
        let stale = remote_stroke(9, 1, &[(200.0, 200.0, 1)]);
        sync.apply_inbound(&mut target, Packet::stroke_end(&stale)).unwrap();

        let replay = vec![
            Packet::SnapshotBegin { stroke_count: 2 },
            Packet::stroke_end(&a),
            Packet::stroke_end(&b),
            Packet::SnapshotEnd {
                cells: source.territory_snapshot().cells,
            },
        ];
        let results: Vec<Applied> = replay
            .into_iter()
            .map(|packet| sync.apply_inbound(&mut target, packet).unwrap())
            .collect();

        assert_eq!(results[0], Applied::SnapshotStarted);
        assert_eq!(results[3], Applied::SnapshotRestored { strokes: 2 });
        assert!(target.store().get(stale.id).is_none());
        assert_eq!(target.territory().cells(), source.territory().cells());
    }

    #[test]
    fn test_snapshot_cells_staged_until_end() {
        let mut source = canvas();
        let mut sync = SyncProtocol::new();
        let a = remote_stroke(2, 1, &[(1.0, 1.0, 1), (200.0, 200.0, 2)]);
        sync.apply_inbound(&mut source, Packet::stroke_end(&a)).unwrap();
        let mut cells = source.territory_snapshot().cells;
        let tail = cells.split_off(40);

        let mut target = canvas();
        assert_eq!(
            sync.apply_inbound(&mut target, Packet::SnapshotCells { cells: cells.clone() }),
            Ok(Applied::Ignored)
        );

        sync.apply_inbound(&mut target, Packet::SnapshotBegin { stroke_count: 1 })
            .unwrap();
        sync.apply_inbound(&mut target, Packet::stroke_end(&a)).unwrap();
        assert_eq!(
            sync.apply_inbound(&mut target, Packet::SnapshotCells { cells }),
            Ok(Applied::SnapshotStaged { cells: 40 })
        );
        assert_eq!(
            sync.apply_inbound(&mut target, Packet::SnapshotEnd { cells: tail }),
            Ok(Applied::SnapshotRestored { strokes: 1 })
        );
        assert_eq!(target.territory().cells(), source.territory().cells());
    }

    #[test]
    fn test_non_canvas_packets_unhandled() {
        let mut sync = SyncProtocol::new();
        let mut canvas = canvas();
        assert_eq!(
            sync.apply_inbound(&mut canvas, Packet::Heartbeat { timestamp: 1 }),
            Ok(Applied::Unhandled)
        );
    }
}
