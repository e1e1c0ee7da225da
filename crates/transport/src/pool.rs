//! Connection cache for ring request/reply traffic.
//!
//! Every peer address maps to at most one open framed connection. A request holds the
//! connection for a whole write-then-read exchange so replies can never be paired with
//! the wrong request. Each successful exchange pushes the idle deadline forward.
//!
//! A request is sent again on a fresh dial only when the cached connection turns out to
//! be stale: the write fails, or the peer closed the socket before reading the frame.
//! Once a frame may have reached the peer's handler it is never sent twice; a reply that
//! does not arrive within the request timeout is reported as [Error::ReplyTimeout].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::codec::framed;
use crate::codec::FramedStream;
use crate::error::Error;
use crate::error::Result;

/// Default sliding idle deadline of a cached connection, 3 minutes.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(180);
/// Default bound on establishing a TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default bound on waiting for the reply of one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How an exchange failed.
enum ExchangeError {
    /// The frame never reached the peer's handler, sending it again is safe.
    Stale(Error),
    /// The frame may have been handled.
    Delivered(Error),
}

struct CachedConnection {
    stream: FramedStream,
    deadline: Instant,
}

impl CachedConnection {
    fn new(stream: FramedStream, idle_timeout: Duration) -> Self {
        Self {
            stream,
            deadline: Instant::now() + idle_timeout,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    async fn exchange(
        &mut self,
        address: &str,
        msg: Bytes,
        request_timeout: Duration,
        idle_timeout: Duration,
    ) -> std::result::Result<Bytes, ExchangeError> {
        let until = Instant::now() + request_timeout;
        let timed_out = || ExchangeError::Delivered(Error::ReplyTimeout(address.to_string()));

        match tokio::time::timeout_at(until, self.stream.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ExchangeError::Stale(e.into())),
            Err(_) => return Err(timed_out()),
        }

        let reply = match tokio::time::timeout_at(until, self.stream.next()).await {
            Ok(Some(Ok(frame))) => frame.freeze(),
            Ok(Some(Err(e))) => return Err(ExchangeError::Delivered(e.into())),
            // listeners answer every frame they read, so this frame was never handled
            Ok(None) => {
                return Err(ExchangeError::Stale(Error::ConnectionClosed(
                    address.to_string(),
                )))
            }
            Err(_) => return Err(timed_out()),
        };

        self.deadline = Instant::now() + idle_timeout;
        if reply.is_empty() {
            return Err(ExchangeError::Delivered(Error::NoReply(address.to_string())));
        }
        Ok(reply)
    }
}

/// Cache of framed connections keyed by peer address (`host:port`).
pub struct ConnectionPool {
    conns: DashMap<String, Arc<Mutex<CachedConnection>>>,
    idle_timeout: Duration,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

impl ConnectionPool {
    /// Create an empty pool whose connections expire after `idle_timeout` without traffic.
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            conns: DashMap::new(),
            idle_timeout,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the dial timeout.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Override how long a request waits for its reply.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Send `msg` to `address` and wait for exactly one reply frame.
    ///
    /// Fails with [Error::NoReply] when the peer dropped the request, and with
    /// [Error::ReplyTimeout] when no reply came within the request timeout.
    pub async fn request(&self, address: &str, msg: Bytes) -> Result<Bytes> {
        if address.is_empty() {
            return Err(Error::unreachable(address, "empty address"));
        }

        let cached = self.conns.get(address).map(|c| c.value().clone());
        if let Some(conn) = cached {
            let mut conn = conn.lock().await;
            if !conn.is_expired() {
                let outcome = conn
                    .exchange(address, msg.clone(), self.request_timeout, self.idle_timeout)
                    .await;
                match outcome {
                    Ok(reply) => return Ok(reply),
                    Err(ExchangeError::Delivered(Error::NoReply(a))) => {
                        return Err(Error::NoReply(a))
                    }
                    Err(ExchangeError::Delivered(e)) => {
                        drop(conn);
                        self.conns.remove(address);
                        return Err(e);
                    }
                    Err(ExchangeError::Stale(e)) => {
                        tracing::debug!("cached connection to {} is stale, redial: {}", address, e)
                    }
                }
            }
            drop(conn);
            self.conns.remove(address);
        }

        let stream = self.dial(address).await?;
        let mut conn = CachedConnection::new(stream, self.idle_timeout);
        let reply = match conn
            .exchange(address, msg, self.request_timeout, self.idle_timeout)
            .await
        {
            Ok(reply) => Ok(reply),
            Err(ExchangeError::Delivered(Error::NoReply(a))) => Err(Error::NoReply(a)),
            Err(ExchangeError::Delivered(e @ Error::ReplyTimeout(_))) => return Err(e),
            Err(ExchangeError::Delivered(e)) | Err(ExchangeError::Stale(e)) => {
                return Err(Error::unreachable(address, e))
            }
        };
        self.conns
            .insert(address.to_string(), Arc::new(Mutex::new(conn)));
        reply
    }

    /// Drop the cached connection to `address`, if any.
    pub fn remove(&self, address: &str) {
        self.conns.remove(address);
    }

    /// Number of cached connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// Returns `true` if no connection is cached.
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    async fn dial(&self, address: &str) -> Result<FramedStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| Error::unreachable(address, "connect timed out"))?
            .map_err(|e| Error::unreachable(address, e))?;
        stream.set_nodelay(true)?;
        Ok(framed(stream))
    }
}
