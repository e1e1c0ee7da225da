//! At-least-once delivery for client calls.
//!
//! A request is sent and a timer started. When the timer fires first the same request is
//! sent again while the earlier ones stay in flight, and the first successful reply of any
//! attempt wins. Receivers do not deduplicate, so a slow attempt and its retransmission
//! may both be applied.
use std::future::Future;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::jsonrpc::RpcError;

/// Window given to each attempt.
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(10);
/// Attempts before the server is declared unreachable.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 5;

/// Retransmission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    timeout: Duration,
    attempts: usize,
}

impl Default for Retry {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_TIMEOUT, DEFAULT_RETRY_ATTEMPTS)
    }
}

impl Retry {
    /// Send at most `attempts` times, `timeout` apart.
    pub fn new(timeout: Duration, attempts: usize) -> Self {
        Self {
            timeout,
            attempts: attempts.max(1),
        }
    }

    /// Run `send` until one attempt succeeds.
    ///
    /// Transport failures are logged and left to the timer. An error returned by the server
    /// itself is final. When the window of the last attempt closes without success the call
    /// fails with [RpcError::ServerUnreachable].
    pub async fn run<T, F, Fut>(&self, mut send: F) -> Result<T, RpcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let mut in_flight = FuturesUnordered::new();
        in_flight.push(send());
        let mut sent = 1;

        loop {
            let timer = tokio::time::sleep(self.timeout);
            tokio::pin!(timer);
            loop {
                tokio::select! {
                    _ = &mut timer => break,
                    Some(reply) = in_flight.next(), if !in_flight.is_empty() => match reply {
                        Ok(v) => return Ok(v),
                        Err(e) if e.is_transient() => tracing::warn!("RPC error {}", e),
                        Err(e) => return Err(e),
                    },
                }
            }

            if sent >= self.attempts {
                tracing::error!("Server unreachable!");
                return Err(RpcError::ServerUnreachable(sent));
            }
            tracing::info!("Timeout elapsed, send new request n°{}...", sent);
            in_flight.push(send());
            sent += 1;
        }
    }
}
