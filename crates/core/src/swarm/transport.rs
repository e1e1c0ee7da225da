use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chordkv_transport::pool::ConnectionPool;

use crate::dht::Did;
use crate::dht::NodeInfo;
use crate::dht::RingRpc;
use crate::error::Error;
use crate::error::Result;
use crate::message::decode_ring_reply;
use crate::message::encode_ring;
use crate::message::parse_fingers;
use crate::message::Envelope;
use crate::message::RingMessage;

/// Outbound side of the ring listener: ring maintenance calls and application requests
/// over cached connections.
pub struct SwarmTransport {
    pool: ConnectionPool,
}

impl SwarmTransport {
    /// Create a transport whose connections close after `idle_timeout` without traffic
    /// and whose requests give up after `request_timeout` without a reply.
    pub fn new(idle_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            pool: ConnectionPool::new(idle_timeout).with_request_timeout(request_timeout),
        }
    }

    /// Send one ring message, returning `None` for the null reply.
    pub async fn call(&self, address: &str, msg: RingMessage) -> Result<Option<RingMessage>> {
        let reply = self.pool.request(address, encode_ring(&msg)?).await?;
        decode_ring_reply(&reply)
    }

    /// Send `payload` to the application registered under `protocol_id` at `address`.
    pub async fn request_app(&self, address: &str, protocol_id: u32, payload: Bytes) -> Result<Bytes> {
        let frame = Envelope::new(protocol_id, payload).to_bincode()?;
        let reply = Envelope::from_bincode(&self.pool.request(address, frame).await?)?;
        if reply.protocol_id != protocol_id {
            return Err(Error::MalformedMessage(format!(
                "{} answered protocol {} with protocol {}",
                address, protocol_id, reply.protocol_id
            )));
        }
        Ok(reply.payload)
    }

    /// Forget the cached connection to `address`.
    pub fn disconnect(&self, address: &str) {
        self.pool.remove(address);
    }

    /// Number of cached connections.
    pub fn connection_count(&self) -> usize {
        self.pool.len()
    }
}

fn unexpected(address: &str, asked: &str, reply: Option<RingMessage>) -> Error {
    Error::MalformedMessage(format!(
        "{} answered {} with {}",
        address,
        asked,
        reply.as_ref().map(|r| r.name()).unwrap_or("null")
    ))
}

#[async_trait]
impl RingRpc for SwarmTransport {
    async fn ping(&self, address: &str) -> Result<bool> {
        Ok(matches!(
            self.call(address, RingMessage::Ping).await?,
            Some(RingMessage::Pong)
        ))
    }

    async fn get_id(&self, address: &str) -> Result<Did> {
        match self.call(address, RingMessage::GetId).await? {
            Some(RingMessage::SendId(id)) => Ok(id),
            other => Err(unexpected(address, "GetId", other)),
        }
    }

    async fn get_predecessor(&self, address: &str) -> Result<NodeInfo> {
        match self.call(address, RingMessage::GetPred).await? {
            None => Ok(NodeInfo::zero()),
            Some(RingMessage::SendPred(pred)) => Ok(pred),
            other => Err(unexpected(address, "GetPred", other)),
        }
    }

    async fn get_fingers(&self, address: &str) -> Result<Vec<NodeInfo>> {
        match self.call(address, RingMessage::GetFingers).await? {
            Some(RingMessage::SendFingers(fingers)) => Ok(parse_fingers(fingers)),
            other => Err(unexpected(address, "GetFingers", other)),
        }
    }

    async fn get_successors(&self, address: &str) -> Result<Vec<NodeInfo>> {
        match self.call(address, RingMessage::GetSucc).await? {
            Some(RingMessage::SendFingers(successors)) => Ok(parse_fingers(successors)),
            other => Err(unexpected(address, "GetSucc", other)),
        }
    }

    async fn claim_predecessor(&self, address: &str, candidate: &NodeInfo) -> Result<()> {
        self.call(address, RingMessage::ClaimPred(candidate.clone()))
            .await
            .map(|_| ())
    }
}
