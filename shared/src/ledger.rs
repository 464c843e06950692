//! Per-color paint buckets with lazy time-based regeneration.
//!
//! Volume is only recomputed when a bucket is read, consumed, or ticked, so
//! no timer task is needed. Only the local participant's consumption is
//! modelled; remote participants track their own buckets.

use crate::error::PaintError;
use crate::stroke::Color;
use crate::PaintConfig;
use log::debug;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PaintBucket {
    pub color: Color,
    volume: f32,
    pub max_volume: f32,
    /// Units regained per second
    pub refill_rate: f32,
    /// Milliseconds
    last_refill: u64,
}

impl PaintBucket {
    pub fn new(color: Color, max_volume: f32, refill_rate: f32, now: u64) -> Self {
        let max_volume = max_volume.max(0.0);
        Self {
            color,
            volume: max_volume,
            max_volume,
            refill_rate: refill_rate.max(0.0),
            last_refill: now,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn last_refill(&self) -> u64 {
        self.last_refill
    }

    /// Brings the volume up to date with `now`. Earlier timestamps are ignored.
    pub fn refill(&mut self, now: u64) {
        if now <= self.last_refill {
            return;
        }

        let elapsed_secs = (now - self.last_refill) as f32 / 1000.0;
        self.volume = (self.volume + self.refill_rate * elapsed_secs).min(self.max_volume);
        self.last_refill = now;
    }

    /// Takes `amount` from the bucket. Over-consumption drains it to zero and
    /// reports [`PaintError::ResourceExhausted`].
    pub fn consume(&mut self, amount: f32, now: u64) -> Result<(), PaintError> {
        self.refill(now);

        let amount = amount.max(0.0);
        if amount > self.volume {
            self.volume = 0.0;
            return Err(PaintError::ResourceExhausted { color: self.color });
        }

        self.volume -= amount;
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, self.max_volume);
    }
}

/// Read-only view of a bucket for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketLevel {
    pub color: Color,
    pub volume: f32,
    pub max_volume: f32,
}

impl BucketLevel {
    pub fn fraction(&self) -> f32 {
        if self.max_volume <= 0.0 {
            0.0
        } else {
            self.volume / self.max_volume
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaintLedger {
    buckets: HashMap<Color, PaintBucket>,
    /// Palette order for stable display
    order: Vec<Color>,
}

impl PaintLedger {
    /// Creates one full bucket per palette color.
    pub fn new(config: &PaintConfig, now: u64) -> Self {
        let mut buckets = HashMap::new();
        let mut order = Vec::new();

        for color in &config.palette {
            if buckets.contains_key(color) {
                continue;
            }
            buckets.insert(
                *color,
                PaintBucket::new(*color, config.bucket_max_volume, config.bucket_refill_rate, now),
            );
            order.push(*color);
        }

        Self { buckets, order }
    }

    pub fn bucket(&self, color: Color) -> Option<&PaintBucket> {
        self.buckets.get(&color)
    }

    pub fn bucket_mut(&mut self, color: Color) -> Option<&mut PaintBucket> {
        self.buckets.get_mut(&color)
    }

    pub fn consume(&mut self, color: Color, amount: f32, now: u64) -> Result<(), PaintError> {
        let bucket = self
            .buckets
            .get_mut(&color)
            .ok_or(PaintError::UnknownColor(color))?;

        let result = bucket.consume(amount, now);
        if result.is_err() {
            debug!("Bucket {} drained while consuming {:.2}", color, amount);
        }
        result
    }

    /// Current volume after lazy refill.
    pub fn available(&mut self, color: Color, now: u64) -> Result<f32, PaintError> {
        let bucket = self
            .buckets
            .get_mut(&color)
            .ok_or(PaintError::UnknownColor(color))?;
        bucket.refill(now);
        Ok(bucket.volume())
    }

    pub fn refill_tick(&mut self, now: u64) {
        for bucket in self.buckets.values_mut() {
            bucket.refill(now);
        }
    }

    pub fn levels(&self) -> Vec<BucketLevel> {
        self.order
            .iter()
            .filter_map(|color| self.buckets.get(color))
            .map(|bucket| BucketLevel {
                color: bucket.color,
                volume: bucket.volume(),
                max_volume: bucket.max_volume,
            })
            .collect()
    }

    pub fn colors(&self) -> &[Color] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn red() -> Color {
        Color::rgb(255, 0, 0)
    }

    #[test]
    fn test_bucket_starts_full() {
        let bucket = PaintBucket::new(red(), 50.0, 5.0, 0);
        assert_eq!(bucket.volume(), 50.0);
    }

    #[test]
    fn test_consume_and_refill() {
        let mut bucket = PaintBucket::new(red(), 100.0, 10.0, 0);
        bucket.consume(40.0, 0).unwrap();
        assert_approx_eq!(bucket.volume(), 60.0);

        // 2.5 seconds at 10 units/s
        bucket.refill(2500);
        assert_approx_eq!(bucket.volume(), 85.0);
        assert_eq!(bucket.last_refill(), 2500);
    }

    #[test]
    fn test_refill_caps_at_max() {
        let mut bucket = PaintBucket::new(red(), 100.0, 10.0, 0);
        bucket.consume(5.0, 0).unwrap();
        bucket.refill(60_000);
        assert_eq!(bucket.volume(), 100.0);
    }

    #[test]
    fn test_overconsumption_drains_to_zero() {
        let mut bucket = PaintBucket::new(red(), 10.0, 0.0, 0);
        let result = bucket.consume(25.0, 0);
        assert_eq!(result, Err(PaintError::ResourceExhausted { color: red() }));
        assert_eq!(bucket.volume(), 0.0);
    }

    #[test]
    fn test_refill_ignores_time_going_backwards() {
        let mut bucket = PaintBucket::new(red(), 100.0, 10.0, 1000);
        bucket.set_volume(10.0);
        bucket.refill(500);
        assert_eq!(bucket.volume(), 10.0);
        assert_eq!(bucket.last_refill(), 1000);
    }

    #[test]
    fn test_volume_stays_in_range() {
        let mut bucket = PaintBucket::new(red(), 20.0, 3.0, 0);
        let mut now = 0;
        for i in 0..200u64 {
            now += (i * 37) % 900;
            let amount = ((i * 13) % 11) as f32;
            let _ = bucket.consume(amount, now);
            assert!(bucket.volume() >= 0.0);
            assert!(bucket.volume() <= bucket.max_volume);
        }
    }

    #[test]
    fn test_ledger_unknown_color() {
        let mut ledger = PaintLedger::new(&PaintConfig::default(), 0);
        let missing = Color::rgb(1, 2, 3);
        assert_eq!(
            ledger.consume(missing, 1.0, 0),
            Err(PaintError::UnknownColor(missing))
        );
    }

    #[test]
    fn test_ledger_levels_follow_palette_order() {
        let config = PaintConfig::default();
        let mut ledger = PaintLedger::new(&config, 0);
        ledger.consume(config.palette[1], 30.0, 0).unwrap();

        let levels = ledger.levels();
        assert_eq!(levels.len(), config.palette.len());
        assert_eq!(levels[0].color, config.palette[0]);
        assert_approx_eq!(levels[1].fraction(), 1.0 - 30.0 / config.bucket_max_volume);
    }

    #[test]
    fn test_refill_tick_updates_every_bucket() {
        let config = PaintConfig::default();
        let mut ledger = PaintLedger::new(&config, 0);
        for color in config.palette.clone() {
            ledger.bucket_mut(color).unwrap().set_volume(0.0);
        }

        ledger.refill_tick(1000);

        for level in ledger.levels() {
            assert_approx_eq!(level.volume, config.bucket_refill_rate);
        }
    }
}
