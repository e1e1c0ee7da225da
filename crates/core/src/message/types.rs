#![warn(missing_docs)]
//! This module defines the ring maintenance messages.
//! Most of them follow the request/reply pattern, such as `GetId` answered by `SendId`.

use serde::Deserialize;
use serde::Serialize;

use crate::dht::Did;
use crate::dht::NodeInfo;

/// Commands of the ring maintenance sub-protocol, carried with protocol id 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingMessage {
    /// Liveness probe.
    Ping,
    /// Answer to [RingMessage::Ping].
    Pong,
    /// Ask for the identifier of the receiver.
    GetId,
    /// Answer to [RingMessage::GetId].
    SendId(Did),
    /// Ask for the predecessor of the receiver. A node without one answers the null reply.
    GetPred,
    /// Answer to [RingMessage::GetPred].
    SendPred(NodeInfo),
    /// The sender advertises itself as predecessor of the receiver.
    ClaimPred(NodeInfo),
    /// Ask for the finger table of the receiver.
    GetFingers,
    /// Ask for the successor list of the receiver.
    GetSucc,
    /// Answer to [RingMessage::GetFingers] and [RingMessage::GetSucc]. Zero entries are
    /// left out.
    SendFingers(Vec<NodeInfo>),
}

impl RingMessage {
    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            RingMessage::Ping => "Ping",
            RingMessage::Pong => "Pong",
            RingMessage::GetId => "GetId",
            RingMessage::SendId(_) => "SendId",
            RingMessage::GetPred => "GetPred",
            RingMessage::SendPred(_) => "SendPred",
            RingMessage::ClaimPred(_) => "ClaimPred",
            RingMessage::GetFingers => "GetFingers",
            RingMessage::GetSucc => "GetSucc",
            RingMessage::SendFingers(_) => "SendFingers",
        }
    }
}
