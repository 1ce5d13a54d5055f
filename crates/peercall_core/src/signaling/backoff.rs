/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use rand::{thread_rng, Rng};
use std::time::Duration;

const JITTER_MAX_MS: u64 = 200;

/// Exponential reconnect delay: doubles from `base` up to `max`, plus random jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay + jitter()
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

fn jitter() -> Duration {
    Duration::from_millis(thread_rng().gen_range(0..=JITTER_MAX_MS))
}
