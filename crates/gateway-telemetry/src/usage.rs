//! Usage recording.
//!
//! Every generate request produces exactly one usage row. Writes are retried
//! with doubling backoff; when every attempt fails the row is dropped, logged
//! at error level and counted, and the caller still gets its response.

use crate::metrics::Metrics;
use gateway_core::{NewUsageLog, StoreError, UsageLog, UsageStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// A usage row could not be written
#[derive(Debug, Error)]
#[error("Failed to write usage log for request {request_id} after {attempts} attempts: {source}")]
pub struct UsageLogWriteError {
    /// Request the row belonged to
    pub request_id: String,
    /// Attempts made
    pub attempts: u32,
    /// Last store error
    #[source]
    pub source: StoreError,
}

/// Recorder settings
#[derive(Debug, Clone)]
pub struct UsageRecorderConfig {
    /// Characters of prompt kept in each row
    pub prompt_preview_chars: usize,
    /// Write attempts before giving up
    pub write_attempts: u32,
    /// Delay before the first retry
    pub write_backoff: Duration,
}

impl Default for UsageRecorderConfig {
    fn default() -> Self {
        Self {
            prompt_preview_chars: 200,
            write_attempts: 3,
            write_backoff: Duration::from_millis(50),
        }
    }
}

/// Truncate `text` to at most `max_chars` characters
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Append-only writer for usage rows
pub struct UsageRecorder {
    store: Arc<dyn UsageStore>,
    metrics: Option<Metrics>,
    config: UsageRecorderConfig,
}

impl UsageRecorder {
    /// Create a new recorder
    pub fn new(store: Arc<dyn UsageStore>, config: UsageRecorderConfig) -> Self {
        Self {
            store,
            metrics: None,
            config,
        }
    }

    /// Count dropped rows in these metrics
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Recorder settings
    #[must_use]
    pub fn config(&self) -> &UsageRecorderConfig {
        &self.config
    }

    /// Write one row. Failed rows always carry zero cost.
    ///
    /// # Errors
    /// Returns the last store error once every attempt has failed; it has
    /// already been logged and counted.
    pub async fn record(&self, mut entry: NewUsageLog) -> Result<UsageLog, UsageLogWriteError> {
        entry.prompt_preview = preview(&entry.prompt_preview, self.config.prompt_preview_chars);
        if entry.is_error() {
            entry.cost_usd = 0.0;
        }

        let attempts = self.config.write_attempts.max(1);
        let mut backoff = self.config.write_backoff;
        let mut attempt = 1;

        loop {
            match self.store.append(&entry).await {
                Ok(log) => {
                    debug!(
                        request_id = %entry.request_id,
                        provider = %entry.provider,
                        cached = entry.cached,
                        cost_usd = entry.cost_usd,
                        "Usage recorded"
                    );
                    return Ok(log);
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        request_id = %entry.request_id,
                        attempt,
                        error = %e,
                        "Usage write failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => {
                    let err = UsageLogWriteError {
                        request_id: entry.request_id.clone(),
                        attempts: attempt,
                        source: e,
                    };
                    error!(
                        request_id = %entry.request_id,
                        user_id = %entry.user_id,
                        service = %entry.service,
                        provider = %entry.provider,
                        error = %err,
                        "Dropping usage log"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.usage_write_failures_total.inc();
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl std::fmt::Debug for UsageRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageRecorder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_core::{UsageQuery, UsageSummary};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FlakyStore {
        failures_left: Mutex<u32>,
        rows: Mutex<Vec<UsageLog>>,
    }

    impl FlakyStore {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: Mutex::new(times),
                rows: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl UsageStore for FlakyStore {
        async fn append(&self, entry: &NewUsageLog) -> Result<UsageLog, StoreError> {
            {
                let mut left = self.failures_left.lock();
                if *left > 0 {
                    *left -= 1;
                    return Err(StoreError::Unavailable("database is locked".to_string()));
                }
            }
            let log = UsageLog::stamp(entry.clone());
            self.rows.lock().push(log.clone());
            Ok(log)
        }

        async fn query(&self, _: &UsageQuery) -> Result<Vec<UsageLog>, StoreError> {
            Ok(self.rows.lock().clone())
        }

        async fn summarize(&self, _: &UsageQuery) -> Result<Vec<UsageSummary>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn entry() -> NewUsageLog {
        NewUsageLog {
            request_id: "req-1".to_string(),
            user_id: "u1".to_string(),
            service: "search".to_string(),
            task_type: "general".to_string(),
            provider: "claude".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            input_tokens: 3,
            output_tokens: 4,
            cost_usd: 0.001,
            latency_ms: 12,
            cached: false,
            error_message: None,
            error_kind: None,
            prompt_preview: "héllo wörld".to_string(),
        }
    }

    fn config(preview_chars: usize) -> UsageRecorderConfig {
        UsageRecorderConfig {
            prompt_preview_chars: preview_chars,
            write_attempts: 3,
            write_backoff: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("short", 50), "short");
        assert_eq!(preview("", 3), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let store = Arc::new(FlakyStore::failing(2));
        let recorder = UsageRecorder::new(store.clone(), config(5));

        let log = recorder.record(entry()).await.unwrap();
        assert_eq!(log.entry.prompt_preview, "héllo");
        assert_eq!(store.rows.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_and_counts_failure() {
        let metrics = Metrics::new().unwrap();
        let store = Arc::new(FlakyStore::failing(10));
        let recorder = UsageRecorder::new(store.clone(), config(200)).with_metrics(metrics.clone());

        let err = recorder.record(entry()).await.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(metrics.usage_write_failures_total.get(), 1);
        assert!(store.rows.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_rows_have_zero_cost() {
        let store = Arc::new(FlakyStore::default());
        let recorder = UsageRecorder::new(store.clone(), config(200));

        let mut failed = entry();
        failed.error_message = Some("upstream 503".to_string());
        failed.error_kind = Some("provider_unavailable".to_string());
        let log = recorder.record(failed).await.unwrap();
        assert_eq!(log.entry.cost_usd, 0.0);
    }
}
