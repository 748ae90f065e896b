//! Human-like pacing.
//!
//! Every randomized pause and coin flip in the executor and loop goes through
//! a [`Pacer`], so tests can swap in [`NoPacing`] and get a deterministic run
//! with the same control flow.

use std::time::Duration;

pub trait Pacer: Send + Sync {
    /// Blocks for a duration drawn from `[min_ms, max_ms]`.
    fn pause(&self, min_ms: u64, max_ms: u64);

    /// Returns true with probability `p`.
    fn chance(&self, p: f64) -> bool;

    /// Draws a value from `[lo, hi]`.
    fn uniform(&self, lo: f64, hi: f64) -> f64;
}

/// Randomized pacing backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct HumanPacer;

impl Pacer for HumanPacer {
    fn pause(&self, min_ms: u64, max_ms: u64) {
        let ms = self.uniform(min_ms as f64, max_ms.max(min_ms) as f64);
        std::thread::sleep(Duration::from_millis(ms.round() as u64));
    }

    fn chance(&self, p: f64) -> bool {
        rand::random::<f64>() < p
    }

    fn uniform(&self, lo: f64, hi: f64) -> f64 {
        lo + rand::random::<f64>() * (hi - lo)
    }
}

/// No sleeps, no surprises: every chance is false and every draw is the midpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPacing;

impl Pacer for NoPacing {
    fn pause(&self, _min_ms: u64, _max_ms: u64) {}

    fn chance(&self, _p: f64) -> bool {
        false
    }

    fn uniform(&self, lo: f64, hi: f64) -> f64 {
        (lo + hi) / 2.0
    }
}
