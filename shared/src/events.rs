//! Typed engine events with per-kind subscriber channels.

use crate::stroke::{Color, Stroke, StrokeId};
use crate::territory::CanvasArea;
use log::trace;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum PaintEvent {
    /// A begin or extend found the bucket dry
    PaintEmpty { color: Color },
    StrokeStarted {
        id: StrokeId,
        author_id: u32,
        local: bool,
    },
    /// Final stroke, for scoring consumers
    StrokeCompleted { stroke: Stroke, local: bool },
    TerritoryChanged { cells: Vec<CanvasArea> },
    CanvasCleared,
    SnapshotRestored { strokes: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaintEventKind {
    PaintEmpty,
    StrokeStarted,
    StrokeCompleted,
    TerritoryChanged,
    CanvasCleared,
    SnapshotRestored,
}

impl PaintEvent {
    pub fn kind(&self) -> PaintEventKind {
        match self {
            PaintEvent::PaintEmpty { .. } => PaintEventKind::PaintEmpty,
            PaintEvent::StrokeStarted { .. } => PaintEventKind::StrokeStarted,
            PaintEvent::StrokeCompleted { .. } => PaintEventKind::StrokeCompleted,
            PaintEvent::TerritoryChanged { .. } => PaintEventKind::TerritoryChanged,
            PaintEvent::CanvasCleared => PaintEventKind::CanvasCleared,
            PaintEvent::SnapshotRestored { .. } => PaintEventKind::SnapshotRestored,
        }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: HashMap<PaintEventKind, Vec<mpsc::UnboundedSender<PaintEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: PaintEventKind) -> mpsc::UnboundedReceiver<PaintEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(kind).or_default().push(tx);
        rx
    }

    /// Delivers to every live subscriber of the event's kind. Subscribers
    /// whose receiver was dropped are forgotten.
    pub fn publish(&mut self, event: PaintEvent) {
        let Some(senders) = self.subscribers.get_mut(&event.kind()) else {
            return;
        };
        senders.retain(|tx| tx.send(event.clone()).is_ok());
        trace!("Published {:?} to {} subscribers", event.kind(), senders.len());
    }

    pub fn subscriber_count(&self, kind: PaintEventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_only_matching_kind() {
        let mut bus = EventBus::new();
        let mut empty_rx = bus.subscribe(PaintEventKind::PaintEmpty);
        let mut clear_rx = bus.subscribe(PaintEventKind::CanvasCleared);

        bus.publish(PaintEvent::PaintEmpty {
            color: Color::rgb(255, 0, 0),
        });

        assert!(matches!(
            empty_rx.try_recv(),
            Ok(PaintEvent::PaintEmpty { .. })
        ));
        assert!(clear_rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let rx = bus.subscribe(PaintEventKind::CanvasCleared);
        let mut kept = bus.subscribe(PaintEventKind::CanvasCleared);
        drop(rx);

        bus.publish(PaintEvent::CanvasCleared);

        assert_eq!(bus.subscriber_count(PaintEventKind::CanvasCleared), 1);
        assert_eq!(kept.try_recv(), Ok(PaintEvent::CanvasCleared));
    }

    #[test]
    fn test_async_receive() {
        let mut bus = EventBus::new();
        let mut rx = bus.subscribe(PaintEventKind::SnapshotRestored);
        bus.publish(PaintEvent::SnapshotRestored { strokes: 3 });

        let event = tokio_test::block_on(rx.recv());
        assert_eq!(event, Some(PaintEvent::SnapshotRestored { strokes: 3 }));
    }
}
