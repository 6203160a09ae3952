//! Bounded retry with exponential backoff around model calls
//!
//! - Attempts: `max_attempts` total, including the first call (default 2)
//! - Each attempt is bounded by `attempt_timeout`
//! - Delay before attempt n+1: `base_delay_ms * 2^(n-1)`, capped, optional ±25% jitter
//! - Permanent errors (configuration, validation) stop immediately

use crate::errors::{GrpoError, Result};
use crate::telemetry::{self, TelemetryCollector, TelemetryEvent};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Default number of attempts (first call + one retry)
pub const MAX_ATTEMPTS: u32 = 2;

/// Base delay for exponential backoff
const BASE_DELAY_MS: u64 = 500;

/// Maximum delay cap
const MAX_DELAY_MS: u64 = 8000;

/// Default per-attempt timeout
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a call that never succeeded
#[derive(Debug)]
pub struct RetryFailure {
    /// Attempts actually made
    pub attempts: u32,
    pub last_error: GrpoError,
}

/// Retry manager with exponential backoff
#[derive(Clone)]
pub struct RetryManager {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    attempt_timeout: Duration,
    enable_jitter: bool,
    telemetry: Option<TelemetryCollector>,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryManager {
    /// Create retry manager with default settings
    pub fn new() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            attempt_timeout: ATTEMPT_TIMEOUT,
            enable_jitter: true,
            telemetry: None,
        }
    }

    /// Create retry manager with custom settings
    ///
    /// `max_attempts` is held to `1..=MAX_ATTEMPTS`.
    pub fn with_config(max_attempts: u32, base_delay_ms: u64, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
            base_delay_ms,
            attempt_timeout,
            ..Self::new()
        }
    }

    /// Disable jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.enable_jitter = false;
        self
    }

    /// Count retries in `collector`
    pub fn with_telemetry(mut self, collector: TelemetryCollector) -> Self {
        self.telemetry = Some(collector);
        self
    }

    /// Execute operation with retry logic
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        mut operation: F,
    ) -> std::result::Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = match tokio::time::timeout(self.attempt_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(GrpoError::Timeout {
                    duration_ms: self.attempt_timeout.as_millis() as u64,
                }),
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !Self::is_retryable(&error) || attempt >= self.max_attempts {
                return Err(RetryFailure {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.calculate_delay(attempt);
            telemetry::emit_extraction_retry(attempt, delay.as_millis() as u64, &error);
            if let Some(collector) = &self.telemetry {
                collector.record(TelemetryEvent::ExtractionRetry);
            }
            sleep(delay).await;
        }
    }

    /// Delay after the given (1-based) failed attempt
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2u64.pow(exponent))
            .min(self.max_delay_ms);

        let final_delay = if self.enable_jitter && delay_ms > 0 {
            let jitter = (delay_ms / 4) as f64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter;
            ((delay_ms as f64) + random_jitter).max(0.0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Upper bound on total backoff sleep (ignoring jitter)
    pub fn max_total_wait_time(&self) -> Duration {
        let total_ms: u64 = (1..self.max_attempts)
            .map(|attempt| {
                self.base_delay_ms
                    .saturating_mul(2u64.pow(attempt.saturating_sub(1).min(16)))
                    .min(self.max_delay_ms)
            })
            .sum();
        Duration::from_millis(total_ms)
    }

    /// Transient failures are worth another call; the rest are not
    pub fn is_retryable(error: &GrpoError) -> bool {
        match error {
            GrpoError::Timeout { .. }
            | GrpoError::Http(_)
            | GrpoError::ModelApi(_)
            | GrpoError::MalformedDecision(_)
            | GrpoError::Serialization(_) => true,

            GrpoError::Validation(_)
            | GrpoError::NotFound { .. }
            | GrpoError::Extraction { .. }
            | GrpoError::Storage(_)
            | GrpoError::Config(_)
            | GrpoError::Io(_) => false,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }
}
