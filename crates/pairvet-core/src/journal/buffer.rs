//! Write buffering for decision logs.
//!
//! Buffering batches several decisions into one read-merge-write cycle,
//! which both cuts store round trips and shrinks the lost-update window.
//! Lines stay in the buffer until a flush succeeds; a failed flush keeps
//! them queued so the next flush carries them again.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::BufferConfig;

use super::{AppendOutcome, DecisionLog, JournalError};

struct PendingLine {
    line: String,
    queued_at: Instant,
}

/// A [`DecisionLog`] with a local write buffer.
///
/// `is_due` reports whether the size or age threshold has been crossed;
/// callers flush on demand at transaction boundaries regardless.
pub struct BufferedLog {
    log: DecisionLog,
    max_pending: usize,
    max_age: Duration,
    pending: Vec<PendingLine>,
}

impl BufferedLog {
    /// Wraps a log with the configured thresholds.
    pub fn new(log: DecisionLog, config: &BufferConfig) -> Self {
        Self {
            log,
            max_pending: config.max_pending.max(1),
            max_age: Duration::from_secs(config.max_age_secs),
            pending: Vec::new(),
        }
    }

    /// Read access to the underlying log.
    #[must_use]
    pub fn log(&self) -> &DecisionLog {
        &self.log
    }

    /// Queues one encoded line.
    pub fn push(&mut self, line: String) {
        self.pending.push(PendingLine {
            line,
            queued_at: Instant::now(),
        });
    }

    /// Number of queued lines.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Whether the size or age threshold has been crossed.
    #[must_use]
    pub fn is_due(&self) -> bool {
        if self.pending.len() >= self.max_pending {
            return true;
        }
        self.pending
            .first()
            .is_some_and(|oldest| oldest.queued_at.elapsed() >= self.max_age)
    }

    /// Flushes every queued line now.
    ///
    /// # Errors
    ///
    /// Propagates the append failure; queued lines are retained for the
    /// next flush.
    pub async fn flush(&mut self) -> Result<AppendOutcome, JournalError> {
        if self.pending.is_empty() {
            return Ok(AppendOutcome::default());
        }
        let lines: Vec<String> = self.pending.iter().map(|p| p.line.clone()).collect();
        let outcome = self.log.append(&lines).await?;
        self.pending.clear();
        Ok(outcome)
    }

    /// Flushes only when a threshold is due; `Ok(None)` means nothing was
    /// written.
    ///
    /// # Errors
    ///
    /// Propagates the append failure; queued lines are retained.
    pub async fn flush_if_due(&mut self) -> Result<Option<AppendOutcome>, JournalError> {
        if !self.is_due() {
            return Ok(None);
        }
        self.flush().await.map(Some)
    }
}
