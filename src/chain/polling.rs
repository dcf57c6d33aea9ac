// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded polling and retry helpers.
//!
//! The ledger offers no completion notification for the flows driven here,
//! so inclusion and finality are observed by polling with exponential backoff
//! under a hard timeout.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::client::ChainError;

/// Exponential-backoff polling policy with a hard timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before the second probe
    pub initial_interval: Duration,
    /// Upper bound for the delay between probes
    pub max_interval: Duration,
    /// Total time allowed before giving up
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            timeout: Duration::from_secs(120),
        }
    }
}

impl PollPolicy {
    /// Delay that follows `current` under doubling backoff.
    pub fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval)
    }
}

/// Fixed-backoff retry policy for establishing connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Probe until it yields a value or the policy's timeout elapses.
///
/// Probe errors abort immediately; only "not yet" (`Ok(None)`) is retried.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    waiting_for: &str,
    mut probe: F,
) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ChainError>>,
{
    let started = Instant::now();
    let mut interval = policy.initial_interval;

    loop {
        if let Some(value) = probe().await? {
            return Ok(value);
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            return Err(ChainError::FinalityTimeout {
                waiting_for: waiting_for.to_string(),
                waited: elapsed,
            });
        }

        tracing::debug!(
            waiting_for,
            elapsed_ms = elapsed.as_millis() as u64,
            next_probe_ms = interval.as_millis() as u64,
            "Condition not met yet"
        );

        tokio::time::sleep(interval.min(policy.timeout - elapsed)).await;
        interval = policy.next_interval(interval);
    }
}

/// Run `op` until it succeeds or the attempts are exhausted.
///
/// Only transient errors are retried. The last error is returned unchanged
/// so callers keep the failure tier.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    step: &str,
    mut op: F,
) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(step, attempt, attempts, error = %e, "Attempt failed, retrying");
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
