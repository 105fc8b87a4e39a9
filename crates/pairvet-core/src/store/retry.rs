//! Retry with exponential backoff around any blob store.
//!
//! Wraps a [`BlobStore`] so that every call first passes the rate gate,
//! then runs under a fixed attempt budget. Only transient failures are
//! retried; not-found and permission failures pass through on the first
//! try. The budget is absolute: a store that never recovers sees exactly
//! `max_attempts` calls and then the last error surfaces.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{BlobEntry, BlobId, BlobStore, RateGate, StoreError};
use crate::config::{RateConfig, RetryConfig};

/// Rate-gated, retrying decorator over a [`BlobStore`].
pub struct RetryingStore {
    inner: Arc<dyn BlobStore>,
    gate: RateGate,
    retry: RetryConfig,
}

impl RetryingStore {
    /// Wraps `inner` with the given retry budget and rate smoothing.
    #[must_use]
    pub fn new(inner: Arc<dyn BlobStore>, retry: RetryConfig, rate: RateConfig) -> Self {
        Self {
            inner,
            gate: RateGate::new(rate),
            retry,
        }
    }

    /// Sleep after failed attempt `n` (1-based): exponential, capped.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .retry
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.retry.max_delay_ms);
        Duration::from_millis(ms)
    }

    async fn run<T, Fut>(
        &self,
        op: &'static str,
        target: &BlobId,
        mut call: impl FnMut() -> Fut + Send,
    ) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        let mut attempt: u32 = 1;
        loop {
            self.gate.admit().await;
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(op, target = %target, attempt, "store call recovered");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        op,
                        target = %target,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "transient store failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    if error.is_transient() {
                        tracing::warn!(
                            op,
                            target = %target,
                            attempts = attempt,
                            error = %error,
                            "retry budget exhausted"
                        );
                    }
                    return Err(error);
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for RetryingStore {
    async fn get(&self, id: &BlobId) -> Result<Bytes, StoreError> {
        self.run("get", id, || self.inner.get(id)).await
    }

    async fn put(&self, id: &BlobId, bytes: Bytes) -> Result<(), StoreError> {
        self.run("put", id, || self.inner.put(id, bytes.clone())).await
    }

    async fn list(&self, folder: &BlobId) -> Result<Vec<BlobEntry>, StoreError> {
        self.run("list", folder, || self.inner.list(folder)).await
    }

    async fn create_link(
        &self,
        target: &BlobId,
        name: &str,
        folder: &BlobId,
    ) -> Result<BlobId, StoreError> {
        self.run("create_link", target, || {
            self.inner.create_link(target, name, folder)
        })
        .await
    }

    async fn create(
        &self,
        name: &str,
        folder: &BlobId,
        bytes: Bytes,
    ) -> Result<BlobId, StoreError> {
        self.run("create", folder, || {
            self.inner.create(name, folder, bytes.clone())
        })
        .await
    }

    async fn delete(&self, id: &BlobId) -> Result<(), StoreError> {
        self.run("delete", id, || self.inner.delete(id)).await
    }
}
