//! ABOUTME: Bounded, cancellable retry loop for establishing target connections
//! ABOUTME: Fixed delay between attempts, per-attempt timeout, infinite budget support

use std::future::Future;
use std::time::Duration;

use pse_config::TargetDescriptor;
use pse_core::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How many retries may follow the first attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    /// Up to N retries after the first attempt (N + 1 attempts in total)
    Limited(u32),
    /// Retry until cancelled
    Infinite,
}

impl RetryBudget {
    /// Map the configured value: negative means infinite
    pub fn from_config(max_retries: i64) -> Self {
        if max_retries < 0 {
            RetryBudget::Infinite
        } else {
            RetryBudget::Limited(u32::try_from(max_retries).unwrap_or(u32::MAX))
        }
    }

    /// Whether another attempt is allowed after `retries_done` retries
    pub fn allows_retry(&self, retries_done: u32) -> bool {
        match self {
            RetryBudget::Limited(max) => retries_done < *max,
            RetryBudget::Infinite => true,
        }
    }
}

/// Configuration for connection establishment
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub budget: RetryBudget,
    /// Upper bound for a single attempt
    pub connect_timeout: Duration,
    /// Fixed wait between attempts
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: RetryBudget::Limited(6),
            connect_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_descriptor(descriptor: &TargetDescriptor) -> Self {
        Self {
            budget: RetryBudget::from_config(descriptor.max_connection_retries),
            connect_timeout: descriptor.connect_timeout(),
            retry_delay: descriptor.retry_delay(),
        }
    }
}

/// Run `attempt` until it succeeds, the budget is spent, or `cancel` fires.
///
/// Attempts are sequential. Cancellation is observed both while an attempt is
/// in flight and during the inter-attempt wait, and is never retried.
pub async fn connect_with_retry<T, F, Fut>(
    target: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts: u32 = 0;

    loop {
        // select! builds the attempt future before polling the cancel branch
        if cancel.is_cancelled() {
            return Err(cancelled(target, attempts));
        }
        attempts = attempts.saturating_add(1);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(cancelled(target, attempts));
            }
            outcome = tokio::time::timeout(policy.connect_timeout, attempt()) => outcome,
        };

        let err = match outcome {
            Ok(Ok(conn)) => {
                if attempts > 1 {
                    info!(target_name = %target, attempts, "Connected after retry");
                }
                return Ok(conn);
            }
            Ok(Err(Error::Cancelled(msg))) => return Err(Error::Cancelled(msg)),
            Ok(Err(e)) => e,
            Err(_) => Error::Connection(format!(
                "attempt timed out after {:?}",
                policy.connect_timeout
            )),
        };

        if !policy.budget.allows_retry(attempts - 1) {
            warn!(
                target_name = %target,
                attempts,
                error = %err,
                "Giving up on database target after all retry attempts"
            );
            return Err(Error::StartupConnection(format!(
                "{}: failed after {} attempt(s): {}",
                target, attempts, err
            )));
        }

        debug!(
            target_name = %target,
            attempt = attempts,
            delay_ms = policy.retry_delay.as_millis(),
            error = %err,
            "Connection attempt failed, retrying after delay"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(cancelled(target, attempts));
            }
            _ = tokio::time::sleep(policy.retry_delay) => {}
        }
    }
}

fn cancelled(target: &str, attempts: u32) -> Error {
    Error::Cancelled(format!(
        "{}: connection establishment cancelled after {} attempt(s)",
        target, attempts
    ))
}
