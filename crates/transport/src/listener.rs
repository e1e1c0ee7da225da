//! Accept loop for ring request/reply traffic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use crate::codec::framed;

/// Answers one request frame.
///
/// Returning `None` drops the request: an empty frame is sent back, which the caller
/// observes as [Error::NoReply](crate::error::Error::NoReply). Every frame read from a
/// connection is answered, so a connection that ends without a reply was closed before
/// the request reached the handler.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle a request frame, producing the reply frame.
    async fn handle(&self, data: Bytes) -> Option<Bytes>;
}

/// Accept connections forever, one task per peer connection.
///
/// Connection tasks belong to this future: dropping or aborting it closes them all.
pub async fn serve(listener: TcpListener, handler: Arc<dyn RequestHandler>, idle_timeout: Duration) {
    match listener.local_addr() {
        Ok(addr) => tracing::info!("ring listener started on {}", addr),
        Err(e) => tracing::warn!("ring listener started on unknown address: {}", e),
    }
    let mut conns = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::trace!("accepted ring connection from {}", peer);
                    conns.spawn(handle_connection(stream, handler.clone(), idle_timeout));
                }
                Err(e) => {
                    tracing::error!("failed to accept ring connection: {}", e);
                }
            },
            Some(done) = conns.join_next(), if !conns.is_empty() => {
                if let Err(e) = done {
                    tracing::warn!("ring connection task failed: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, handler: Arc<dyn RequestHandler>, idle_timeout: Duration) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("set_nodelay failed: {}", e);
    }
    let mut stream = framed(stream);
    loop {
        let frame = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Ok(Some(Ok(frame))) => frame.freeze(),
            Ok(Some(Err(e))) => {
                tracing::debug!("ring connection read failed: {}", e);
                return;
            }
            // peer hung up or idle deadline passed
            Ok(None) | Err(_) => return,
        };

        let reply = match handler.handle(frame).await {
            Some(reply) => reply,
            None => {
                tracing::debug!("request dropped, answering with an empty frame");
                Bytes::new()
            }
        };

        if let Err(e) = stream.send(reply).await {
            tracing::debug!("ring connection write failed: {}", e);
            return;
        }
    }
}
