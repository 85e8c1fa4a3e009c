// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use rand::Rng;
use std::time::Duration;

pub const INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const MAX_DELAY: Duration = Duration::from_secs(30);
// Longer floor after credential rejections to avoid hammering the upstream.
pub const AUTH_FLOOR: Duration = Duration::from_secs(30);

/// Reconnect schedule: exponential from 1s to a 30s cap, ±20% jitter.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            base: INITIAL_DELAY,
        }
    }

    pub fn reset(&mut self) {
        self.base = INITIAL_DELAY;
    }

    /// Raise the base to the credential floor.
    pub fn note_auth_failure(&mut self) {
        self.base = self.base.max(AUTH_FLOOR);
    }

    /// The delay to sleep before the next attempt; doubles the base.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.base;
        self.base = self.base.saturating_mul(2).min(MAX_DELAY);
        jitter(current)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

fn jitter(d: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.8..=1.2);
    d.mul_f64(factor)
}
