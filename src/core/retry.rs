//! Retry with exponential backoff and jitter
//!
//! Only transient provider failures are retried (see [`AgentError::is_retryable`]).
//! Each attempt is traced as a `<name>.attempt` child span.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{AgentError, Result};
use crate::observability::{SpanContext, SpanKind, Tracer};

/// Backoff policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_delay_secs: f64,
    pub max_delay_secs: f64,
    pub backoff_factor: f64,
    /// Scale each delay by a random factor in [0.5, 1.0]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_secs: 1.0,
            max_delay_secs: 60.0,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No sleeping between attempts; handy in tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_secs: 0.0,
            max_delay_secs: 0.0,
            backoff_factor: 1.0,
            jitter: false,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = (self.initial_delay_secs * self.backoff_factor.powi(exponent))
            .min(self.max_delay_secs)
            .max(0.0);
        Duration::from_secs_f64(secs)
    }

    /// Delay with jitter applied when enabled
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter {
            base.mul_f64(rand::rng().random_range(0.5..=1.0))
        } else {
            base
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AgentError::config("retry.max_attempts must be at least 1"));
        }
        if self.backoff_factor < 1.0 {
            return Err(AgentError::config("retry.backoff_factor must be >= 1.0"));
        }
        if self.initial_delay_secs < 0.0 || self.max_delay_secs < 0.0 {
            return Err(AgentError::config("retry delays must not be negative"));
        }
        Ok(())
    }
}

/// Seam for waiting between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}

/// Runs fallible async operations under a retry policy
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    tracer: Tracer,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig, tracer: Tracer) -> Self {
        Self {
            config,
            tracer,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out.
    ///
    /// The last error is returned on exhaustion.
    pub async fn execute<T, F, Fut>(&self, name: &str, parent: &SpanContext, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let attempt_name = format!("{}.attempt", name);
        let mut attempt = 1;

        loop {
            let mut span = self.tracer.start_span(&attempt_name, parent);
            span.set_attribute("attempt", attempt);
            span.set_attribute("max_attempts", max_attempts);
            span.set_kind(SpanKind::Client);

            let err = match operation().await {
                Ok(value) => {
                    span.set_ok();
                    span.end();
                    return Ok(value);
                }
                Err(err) => err,
            };

            let retryable = err.is_retryable();
            span.record_error(&err);
            span.set_attribute("retryable", retryable);

            if !retryable || attempt >= max_attempts {
                span.end();
                if retryable {
                    warn!(operation = name, attempts = attempt, error = %err, "retries exhausted");
                } else {
                    debug!(operation = name, kind = err.kind(), "fatal error, not retrying");
                }
                return Err(err);
            }

            let delay = self.config.delay_for(attempt);
            span.set_attribute("backoff_ms", delay.as_millis() as u64);
            let mut event = serde_json::Map::new();
            event.insert("attempt".to_string(), attempt.into());
            event.insert("backoff_ms".to_string(), (delay.as_millis() as u64).into());
            span.add_event("retry.backoff", event);
            span.end();

            warn!(
                operation = name,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Retry without tracing, sleeping on the tokio timer
pub async fn execute_with_retry<T, F, Fut>(operation: F, config: &RetryConfig) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let executor = RetryExecutor::new(config.clone(), Tracer::noop());
    let root = SpanContext {
        trace_id: "untraced".to_string(),
        span_id: String::new(),
    };
    executor.execute("operation", &root, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemoryExporter;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor(config: RetryConfig) -> (RetryExecutor, Arc<RecordingSleeper>, Arc<MemoryExporter>) {
        let exporter = Arc::new(MemoryExporter::new());
        let sleeper = Arc::new(RecordingSleeper::new());
        let executor =
            RetryExecutor::new(config, Tracer::new(exporter.clone())).with_sleeper(sleeper.clone());
        (executor, sleeper, exporter)
    }

    fn parent() -> SpanContext {
        SpanContext {
            trace_id: "t".to_string(),
            span_id: "root".to_string(),
        }
    }

    #[test]
    fn test_base_delay_caps() {
        let config = RetryConfig {
            max_delay_secs: 5.0,
            ..RetryConfig::default()
        };
        assert_eq!(config.base_delay(1), Duration::from_secs(1));
        assert_eq!(config.base_delay(2), Duration::from_secs(2));
        assert_eq!(config.base_delay(3), Duration::from_secs(4));
        assert_eq!(config.base_delay(4), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_bounds() {
        let config = RetryConfig::default();
        for _ in 0..100 {
            let delay = config.delay_for(2);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(2));
        }
    }

    #[tokio::test]
    async fn test_two_rate_limits_then_success() {
        let (executor, sleeper, exporter) = executor(RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        });
        let calls = AtomicU32::new(0);

        let result = executor
            .execute("provider.complete", &parent(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AgentError::rate_limit("429"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        let sleeps = sleeper.sleeps();
        assert_eq!(sleeps.len(), 2);
        assert!(sleeps[0] <= sleeps[1]);

        let attempts = exporter.spans_named("provider.complete.attempt");
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].attributes["error.kind"], "rate_limit");
        assert_eq!(attempts[0].attributes["backoff_ms"], 1000);
        assert_eq!(attempts[2].attributes["attempt"], 3);
        assert!(attempts.iter().all(|a| a.kind == SpanKind::Client));

        let backoffs: Vec<_> = attempts[1].events_named("retry.backoff").collect();
        assert_eq!(backoffs.len(), 1);
        assert_eq!(backoffs[0].attributes["backoff_ms"], 2000);
        assert_eq!(attempts[2].events_named("retry.backoff").count(), 0);
    }

    #[tokio::test]
    async fn test_authentication_is_not_retried() {
        let (executor, sleeper, exporter) = executor(RetryConfig::default());
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor
            .execute("provider.complete", &parent(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AgentError::authentication("bad key")) }
            })
            .await;

        assert!(matches!(result, Err(AgentError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.sleeps().is_empty());
        assert_eq!(exporter.spans()[0].attributes["retryable"], false);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let (executor, sleeper, _) = executor(RetryConfig::immediate(3));
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor
            .execute("provider.complete", &parent(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(AgentError::backend(format!("503 #{}", n))) }
            })
            .await;

        match result {
            Err(AgentError::Backend(msg)) => assert_eq!(msg, "503 #2"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(sleeper.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_free_function() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(AgentError::network("reset"))
                    } else {
                        Ok(n)
                    }
                }
            },
            &RetryConfig::immediate(2),
        )
        .await;
        assert_eq!(result.unwrap(), 1);
    }
}
