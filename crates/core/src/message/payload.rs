//! Wire envelope and the helpers turning ring messages into frames and back.
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use super::types::RingMessage;
use crate::consts::RING_PROTOCOL_ID;
use crate::dht::NodeInfo;
use crate::error::Error;
use crate::error::Result;

/// One frame on a ring connection: a protocol id and an opaque payload.
///
/// Protocol [RING_PROTOCOL_ID] carries a bincode [RingMessage], any other id belongs to
/// a registered application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Selects the sub-protocol.
    pub protocol_id: u32,
    /// Sub-protocol bytes.
    pub payload: Bytes,
}

impl Envelope {
    /// Wrap raw bytes.
    pub fn new(protocol_id: u32, payload: Bytes) -> Self {
        Self {
            protocol_id,
            payload,
        }
    }

    /// Wrap a ring message.
    pub fn ring(msg: &RingMessage) -> Result<Self> {
        let payload = bincode::serialize(msg).map_err(Error::BincodeSerialize)?;
        Ok(Self::new(RING_PROTOCOL_ID, payload.into()))
    }

    /// The null reply of the ring protocol.
    pub fn null() -> Self {
        Self::new(RING_PROTOCOL_ID, Bytes::new())
    }

    /// Returns `true` for the null reply.
    pub fn is_null(&self) -> bool {
        self.protocol_id == RING_PROTOCOL_ID && self.payload.is_empty()
    }

    /// Deserialize from bincode bytes.
    pub fn from_bincode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| Error::MalformedMessage(e.to_string()))
    }

    /// Serialize to bincode bytes.
    pub fn to_bincode(&self) -> Result<Bytes> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(Error::BincodeSerialize)
    }

    /// Read the payload as a ring message.
    pub fn ring_message(&self) -> Result<RingMessage> {
        if self.protocol_id != RING_PROTOCOL_ID {
            return Err(Error::MalformedMessage(format!(
                "protocol {} is not the ring protocol",
                self.protocol_id
            )));
        }
        bincode::deserialize(&self.payload).map_err(|e| Error::MalformedMessage(e.to_string()))
    }
}

/// Encode a ring message into a frame.
pub fn encode_ring(msg: &RingMessage) -> Result<Bytes> {
    Envelope::ring(msg)?.to_bincode()
}

/// The null reply, encoded.
pub fn null_reply() -> Result<Bytes> {
    Envelope::null().to_bincode()
}

/// Decode a ring reply frame. The null reply decodes to `None`.
pub fn decode_ring_reply(frame: &[u8]) -> Result<Option<RingMessage>> {
    let envelope = Envelope::from_bincode(frame)?;
    if envelope.is_null() {
        return Ok(None);
    }
    envelope.ring_message().map(Some)
}

/// Clean a received finger list: zero entries go, and so do repeats of the entry
/// right before them.
pub fn parse_fingers(fingers: Vec<NodeInfo>) -> Vec<NodeInfo> {
    let mut parsed: Vec<NodeInfo> = fingers.into_iter().filter(|f| !f.is_zero()).collect();
    parsed.dedup_by(|a, b| a.address == b.address);
    parsed
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dht::Did;

    #[test]
    fn test_envelope_from_bincode() {
        let claim = RingMessage::ClaimPred(NodeInfo::new("127.0.0.1:3333"));
        let frame = encode_ring(&claim).unwrap();
        let envelope = Envelope::from_bincode(&frame).unwrap();
        assert_eq!(envelope.protocol_id, RING_PROTOCOL_ID);
        assert_eq!(envelope.ring_message().unwrap(), claim);
        assert_eq!(decode_ring_reply(&frame).unwrap(), Some(claim));
    }

    #[test]
    fn test_null_reply() {
        let frame = null_reply().unwrap();
        assert_eq!(decode_ring_reply(&frame).unwrap(), None);

        // an empty payload under another protocol is not the null reply
        let app = Envelope::new(7, Bytes::new());
        assert!(!app.is_null());
        assert!(app.ring_message().is_err());
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            Envelope::from_bincode(&[1, 2, 3]),
            Err(Error::MalformedMessage(_))
        ));
        let bad = Envelope::new(RING_PROTOCOL_ID, Bytes::from_static(&[0xff, 0xff, 0xff, 0xff]));
        assert!(matches!(bad.ring_message(), Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn test_parse_fingers() {
        let a = NodeInfo::new("a:1");
        let b = NodeInfo::new("b:1");
        let parsed = parse_fingers(vec![
            a.clone(),
            NodeInfo::zero(),
            a.clone(),
            b.clone(),
            b.clone(),
            NodeInfo::zero(),
            a.clone(),
        ]);
        assert_eq!(parsed, vec![a.clone(), b, a]);

        let zero_id = NodeInfo::with_id(Did::zero(), "");
        assert!(parse_fingers(vec![zero_id]).is_empty());
    }
}
