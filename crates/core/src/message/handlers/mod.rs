#![warn(missing_docs)]
//! This module implemented message handler of the ring listener.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chordkv_transport::listener::RequestHandler;

use super::payload::Envelope;
use super::types::RingMessage;
use crate::consts::RING_PROTOCOL_ID;
use crate::dht::RingHandle;
use crate::error::Result;

/// Operator and Handler for application protocols
pub mod custom;
/// Operator and Handler for ring maintenance
pub mod dht;

pub use custom::AppRegistry;
pub use custom::Application;

/// MessageHandler answers every frame arriving on the ring listener.
#[derive(Clone)]
pub struct MessageHandler {
    ring: RingHandle,
    apps: Arc<AppRegistry>,
}

/// Generic trait for handle message, inspired by Actor-Model.
///
/// `Ok(None)` drops the request without a reply.
#[async_trait]
pub trait HandleMsg<T> {
    /// Message handler.
    async fn handle(&self, msg: &T) -> Result<Option<Envelope>>;
}

impl MessageHandler {
    /// Create a new MessageHandler instance.
    pub fn new(ring: RingHandle, apps: Arc<AppRegistry>) -> Self {
        Self { ring, apps }
    }

    /// The applications registered at startup.
    pub fn apps(&self) -> &Arc<AppRegistry> {
        &self.apps
    }

    /// Decode a frame and route it by protocol id.
    pub async fn handle_frame(&self, data: &[u8]) -> Result<Option<Envelope>> {
        let envelope = Envelope::from_bincode(data)?;
        if envelope.protocol_id == RING_PROTOCOL_ID {
            let msg = envelope.ring_message()?;
            tracing::trace!("ring message {} received", msg.name());
            HandleMsg::<RingMessage>::handle(self, &msg).await
        } else {
            HandleMsg::<Envelope>::handle(self, &envelope).await
        }
    }
}

#[async_trait]
impl RequestHandler for MessageHandler {
    async fn handle(&self, data: Bytes) -> Option<Bytes> {
        let reply = match self.handle_frame(&data).await {
            Ok(reply) => reply?,
            Err(e) => {
                tracing::warn!("dropping request: {}", e);
                return None;
            }
        };
        match reply.to_bincode() {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!("failed to encode reply: {}", e);
                None
            }
        }
    }
}
