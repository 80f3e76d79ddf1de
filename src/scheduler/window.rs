//! Random historical end-time sampling

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Draws end-times uniformly from `[now - history, now]`
#[derive(Debug, Clone, Copy)]
pub struct EndTimeSampler {
    history: Duration,
}

impl EndTimeSampler {
    /// Sampler reaching `days` back from the reference instant
    pub fn new(days: u32) -> Self {
        Self {
            history: Duration::days(i64::from(days)),
        }
    }

    /// Length of the sampled window
    pub fn history(&self) -> Duration {
        self.history
    }

    /// One end-time, at millisecond resolution
    pub fn sample<R: Rng + ?Sized>(&self, now: DateTime<Utc>, rng: &mut R) -> DateTime<Utc> {
        let span_ms = self.history.num_milliseconds().max(0);
        let offset = rng.gen_range(0..=span_ms);
        now - Duration::milliseconds(offset)
    }
}
