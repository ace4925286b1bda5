//! Rate limiting and retry for outbound provider calls
//!
//! Every provider call goes through [`BehaviorManager::execute_with_result`]:
//! 1. Take a token from the provider's bucket
//! 2. Run the call
//! 3. Retry `rate-limit` / `network` failures with exponential backoff
//!
//! Buckets are keyed by provider, not by operation, because a hosting service
//! enforces a single quota per token. Listing and merging share one budget.

mod limiter;
mod retry;

pub use limiter::RateLimiter;
pub use retry::RetryPolicy;

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Request budget applied to each provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    /// Sustained requests per second
    pub requests_per_second: f64,
    /// Requests allowed back-to-back after an idle period
    pub burst: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst: 10,
        }
    }
}

/// Wraps provider calls with per-provider rate limiting and retry
#[derive(Debug)]
pub struct BehaviorManager {
    rate_limit: RateLimitPolicy,
    retry: RetryPolicy,
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl BehaviorManager {
    /// Create a manager with the given policies
    pub fn new(rate_limit: RateLimitPolicy, retry: RetryPolicy) -> Self {
        Self {
            rate_limit,
            retry,
            limiters: RwLock::new(HashMap::new()),
        }
    }

    /// Retry policy in effect
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The bucket for `provider`, created on first use
    pub fn limiter(&self, provider: &str) -> Arc<RateLimiter> {
        {
            let limiters = self.limiters.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(limiter) = limiters.get(provider) {
                return Arc::clone(limiter);
            }
        }

        let mut limiters = self.limiters.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(limiters.entry(provider.to_string()).or_insert_with(|| {
            debug!(
                provider,
                rps = self.rate_limit.requests_per_second,
                burst = self.rate_limit.burst,
                "creating rate limiter"
            );
            Arc::new(RateLimiter::new(
                self.rate_limit.requests_per_second,
                self.rate_limit.burst,
            ))
        }))
    }

    /// Run a call that produces no value
    pub async fn execute<F, Fut>(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        operation: &str,
        call: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.execute_with_result(cancel, provider, operation, call)
            .await
    }

    /// Run a call under the provider's rate limit, retrying transient failures
    ///
    /// `call` is invoked once per attempt. Non-retryable failures are returned
    /// as-is; exhausting attempts returns the last failure wrapped in
    /// [`Error::RetriesExhausted`]. Cancellation while waiting for a token,
    /// during the call or during backoff returns [`Error::Cancelled`].
    pub async fn execute_with_result<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        operation: &str,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let limiter = self.limiter(provider);
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = limiter.acquire() => {}
            }

            attempt += 1;
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                result = call() => result,
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(provider, operation, attempt, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let kind = err.kind();
            if !kind.is_retryable() {
                debug!(provider, operation, attempt, %kind, error = %err, "call failed, not retryable");
                return Err(err);
            }

            if !self.retry.allows_retry(attempt) {
                warn!(provider, operation, attempts = attempt, %kind, error = %err, "giving up");
                return Err(Error::RetriesExhausted {
                    provider: provider.to_string(),
                    operation: operation.to_string(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.retry.delay_for(attempt - 1);
            warn!(
                provider,
                operation,
                attempt,
                %kind,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient failure, backing off"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
