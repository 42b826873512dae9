//! Bounded retry with a fixed pause between attempts.

use std::future::Future;
use std::time::Duration;

use crate::error::DebateError;

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    /// Upper bound on one attempt. An attempt that runs past it fails with
    /// [`DebateError::Timeout`] and is retried like any other failure.
    pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
            call_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// `op` receives the 1-based attempt number. `on_retry` is called with the
    /// attempt number and error of every failed attempt that will be retried.
    /// The last attempt's error is returned on exhaustion.
    pub async fn run<T, F, Fut, R>(&self, mut op: F, mut on_retry: R) -> Result<T, DebateError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DebateError>>,
        R: FnMut(u32, &DebateError),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match self.call_timeout {
                Some(limit) => match tokio::time::timeout(limit, op(attempt)).await {
                    Ok(result) => result,
                    Err(_) => Err(DebateError::Timeout(limit)),
                },
                None => op(attempt).await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) => {
                    on_retry(attempt, &e);
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
