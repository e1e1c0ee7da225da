//! DHT types about ring members and the remote calls they answer.
#![warn(missing_docs)]
use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use super::did::Did;
use crate::error::Result;

/// A ring member: its identifier and the address its ring listener answers on.
///
/// An empty address marks the zero value, which stands for an unknown or absent member.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    /// `sha256(address)`.
    pub id: Did,
    /// Ring address, `host:port`.
    pub address: String,
}

impl NodeInfo {
    /// Describe the member listening on `address`, deriving its id.
    pub fn new(address: &str) -> Self {
        Self {
            id: Did::digest(address),
            address: address.to_string(),
        }
    }

    /// Describe a member whose id is already known.
    pub fn with_id(id: Did, address: &str) -> Self {
        Self {
            id,
            address: address.to_string(),
        }
    }

    /// The absent member.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns `true` for the absent member.
    pub fn is_zero(&self) -> bool {
        self.address.is_empty()
    }

    /// Host part of the address, used to derive the member's other endpoints.
    pub fn host(&self) -> &str {
        host_of(&self.address)
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            f.write_str("Unknown")
        } else {
            f.write_str(&self.address)
        }
    }
}

/// Strip the port from `host:port`. Text without a port is returned as is.
pub fn host_of(address: &str) -> &str {
    match address.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => address,
    }
}

/// The ring maintenance calls a member can make on another member.
///
/// Every call takes the peer's ring address. A peer that cannot be reached yields
/// [Error::PeerUnreachable](crate::error::Error::PeerUnreachable).
#[async_trait]
pub trait RingRpc: Send + Sync {
    /// Ping a peer. `Ok(true)` when it answered with a pong.
    async fn ping(&self, address: &str) -> Result<bool>;

    /// Ask a peer for its identifier.
    async fn get_id(&self, address: &str) -> Result<Did>;

    /// Ask a peer for its predecessor, the zero member when it has none.
    async fn get_predecessor(&self, address: &str) -> Result<NodeInfo>;

    /// Ask a peer for its finger table. Index 0 of the answer is the peer itself; absent
    /// entries and consecutive repeats are already dropped.
    async fn get_fingers(&self, address: &str) -> Result<Vec<NodeInfo>>;

    /// Ask a peer for its successor list, filtered like [RingRpc::get_fingers].
    async fn get_successors(&self, address: &str) -> Result<Vec<NodeInfo>>;

    /// Tell a peer that `candidate` believes to be its predecessor.
    async fn claim_predecessor(&self, address: &str, candidate: &NodeInfo) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_node() {
        let zero = NodeInfo::zero();
        assert!(zero.is_zero());
        assert_eq!(zero.to_string(), "Unknown");

        let node = NodeInfo::new("10.0.0.7:3333");
        assert!(!node.is_zero());
        assert_eq!(node.id, Did::digest("10.0.0.7:3333"));
        assert_eq!(node.host(), "10.0.0.7");
        assert_eq!(node.to_string(), "10.0.0.7:3333");
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("127.0.0.1:3333"), "127.0.0.1");
        assert_eq!(host_of("node-a:80"), "node-a");
        assert_eq!(host_of("node-a"), "node-a");
        assert_eq!(host_of(""), "");
    }
}
