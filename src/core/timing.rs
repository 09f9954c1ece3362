use async_trait::async_trait;
use chrono::{Local, TimeZone};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::config::DelayRange;

/// Single source of randomness for every delay and click coordinate.
/// Seeding it makes a whole run reproducible.
pub struct Jitter {
    rng: StdRng,
}

impl Jitter {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform value in the inclusive range.
    pub fn pick(&mut self, range: DelayRange) -> u64 {
        self.rng.gen_range(range.min()..=range.max())
    }

    /// `base` plus a signed offset in `[-spread, spread]`, never below one.
    pub fn around(&mut self, base: u64, spread: u64) -> u64 {
        let spread = spread as i64;
        let offset = if spread == 0 {
            0
        } else {
            self.rng.gen_range(-spread..=spread)
        };
        (base as i64 + offset).max(1) as u64
    }

    /// Countdown length for a human-like pause: a base picked from `range`, then jittered.
    pub fn countdown_secs(&mut self, range: DelayRange, spread: u64) -> u64 {
        let base = self.pick(range);
        self.around(base, spread)
    }

    /// Signed offset in `[-window, window]`.
    pub fn signed_offset(&mut self, window: u64) -> i64 {
        let window = window as i64;
        if window == 0 {
            return 0;
        }
        self.rng.gen_range(-window..=window)
    }

    pub fn chance(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    /// Uniformly distributed point inside the disc, floored to whole pixels.
    pub fn point_in_disc(&mut self, center: (f64, f64), radius: f64) -> (i64, i64) {
        let angle = self.rng.gen_range(0.0..std::f64::consts::TAU);
        let r = self.rng.gen_range(0.0f64..1.0).sqrt() * radius;
        (
            (center.0 + r * angle.cos()).floor() as i64,
            (center.1 + r * angle.sin()).floor() as i64,
        )
    }

    pub fn point_in_rect(&mut self, width: u32, height: u32) -> (u32, u32) {
        (
            self.rng.gen_range(0..width.max(1)),
            self.rng.gen_range(0..height.max(1)),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Cancelled,
}

impl WaitOutcome {
    pub fn is_cancelled(self) -> bool {
        self == WaitOutcome::Cancelled
    }
}

/// Renders a running countdown. Kept separate so the core never touches the terminal.
pub trait ProgressReporter: Send + Sync {
    fn tick(&self, remaining_secs: u64, label: &str);
    fn finish(&self);
}

#[async_trait]
pub trait Waiter: Send + Sync {
    /// Visible per-second countdown, e.g. "Waiting 12 seconds to start farming".
    async fn countdown(&self, secs: u64, label: &str) -> WaitOutcome;

    /// Short silent pause.
    async fn pause(&self, duration: Duration) -> WaitOutcome;
}

/// Real-time waiter that stops early once the token is cancelled.
pub struct CountdownWaiter {
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl CountdownWaiter {
    pub fn new(reporter: Arc<dyn ProgressReporter>, cancel: CancellationToken) -> Self {
        Self { reporter, cancel }
    }
}

#[async_trait]
impl Waiter for CountdownWaiter {
    async fn countdown(&self, secs: u64, label: &str) -> WaitOutcome {
        for remaining in (1..=secs).rev() {
            self.reporter.tick(remaining, label);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.reporter.finish();
                    return WaitOutcome::Cancelled;
                }
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
        self.reporter.finish();
        WaitOutcome::Elapsed
    }

    async fn pause(&self, duration: Duration) -> WaitOutcome {
        tokio::select! {
            _ = self.cancel.cancelled() => WaitOutcome::Cancelled,
            _ = tokio::time::sleep(duration) => WaitOutcome::Elapsed,
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Local wall-clock rendering of a millisecond timestamp.
pub fn format_millis(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        None => format!("{} ms", ms),
    }
}
