//! Client-side rate smoothing for outbound store calls.
//!
//! Implements a sliding-window gate over the engine's own call rate. The
//! remote store throttles aggressively under concurrent reviewers; rather
//! than run into its rejections, every call first passes through
//! [`RateGate::admit`], which *delays* the caller until the trailing
//! window has room. The gate never rejects and never returns an error.
//!
//! # Thread Safety
//!
//! The timestamp window lives behind a `Mutex` that is only held for
//! bookkeeping, never across an await. Lock poisoning is absorbed: the
//! window is advisory state and a panicked peer cannot corrupt it in a
//! way that matters.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RateConfig;

/// Sliding-window delay gate for store calls.
///
/// Tracks the instants of recent admissions; when `max_calls` admissions
/// sit inside the trailing `window_secs`, the next caller sleeps until the
/// oldest admission leaves the window.
pub struct RateGate {
    config: RateConfig,
    stamps: Mutex<VecDeque<Instant>>,
}

impl RateGate {
    /// Creates a gate with the given smoothing configuration.
    #[must_use]
    pub fn new(config: RateConfig) -> Self {
        Self {
            config,
            stamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Waits until the window has room, then records the admission.
    ///
    /// Free of charge while the recent call rate is under the ceiling;
    /// otherwise sleeps exactly until the oldest tracked call ages out.
    pub async fn admit(&self) {
        let window = Duration::from_secs(self.config.window_secs);
        loop {
            let wait = {
                let mut stamps = self.lock();
                let now = Instant::now();
                while stamps
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= window)
                {
                    stamps.pop_front();
                }
                if stamps.len() < self.config.max_calls as usize {
                    stamps.push_back(now);
                    None
                } else {
                    stamps
                        .front()
                        .map(|t| window.saturating_sub(now.duration_since(*t)))
                }
            };
            match wait {
                None => return,
                Some(wait) if wait.is_zero() => {}
                Some(wait) => {
                    tracing::debug!(
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        max_calls = self.config.max_calls,
                        window_secs = self.config.window_secs,
                        "rate gate delaying store call"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Number of admissions currently inside the window.
    #[must_use]
    pub fn in_window(&self) -> usize {
        let window = Duration::from_secs(self.config.window_secs);
        let now = Instant::now();
        let stamps = self.lock();
        stamps
            .iter()
            .filter(|t| now.duration_since(**t) < window)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.stamps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
