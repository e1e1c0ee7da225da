//! Error of chordkv_core

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in chordkv-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The peer at `address` could not be reached or did not answer in time.
    #[error("Failed to connect to peer {address}: {reason}")]
    PeerUnreachable { address: String, reason: String },

    /// No owner could be found for an id.
    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    /// The key is not stored on this node.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// A frame or request could not be understood, locally or by the peer.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A bulk transfer did not complete within its window.
    #[error("Bulk transfer timed out: {0}")]
    TransferTimeout(String),

    /// Socket or file IO failure.
    #[error("IOError")]
    IOError(#[from] std::io::Error),

    /// The actor owning the ring state has exited.
    #[error("Ring state actor is not running")]
    RingActorStopped,

    /// [Swarm::start](crate::swarm::Swarm::start) was called twice.
    #[error("Ring node is already started")]
    AlreadyStarted,

    /// Applications cannot register the ring maintenance protocol id.
    #[error("Protocol id {0} is reserved for ring maintenance")]
    InvalidProtocolId(u32),

    /// Another application already serves this protocol id.
    #[error("Protocol id {0} is already registered")]
    ProtocolIdTaken(u32),

    /// A node id is not valid hex.
    #[error("Invalid hexadecimal id")]
    BadHexId(#[from] hex::FromHexError),

    /// A node id does not decode to 32 bytes.
    #[error("Invalid id length, expected 32 bytes, got {0}")]
    BadIdLength(usize),

    /// Encoding a bulk payload failed.
    #[error("JSON serialization error")]
    Serialize(#[source] serde_json::Error),

    /// Decoding a bulk payload failed.
    #[error("JSON deserialization error")]
    Deserialize(#[source] serde_json::Error),

    /// Encoding a ring or storage message failed.
    #[error("Bincode serialization error")]
    BincodeSerialize(#[source] bincode::Error),

    /// Decoding a ring or storage message failed.
    #[error("Bincode deserialization error")]
    BincodeDeserialize(#[source] bincode::Error),

    /// The cold tier backend failed.
    #[error("Cold tier error: {0}")]
    ColdTier(String),

    /// The owner answered a storage request with an error.
    #[error("Storage request failed at the remote node: {0}")]
    RemoteStorage(String),

    /// Any other transport failure.
    #[error("Transport error: {0}")]
    Transport(chordkv_transport::error::Error),
}

impl Error {
    /// Build a [Error::PeerUnreachable] for `address`.
    pub fn unreachable(address: &str, reason: impl ToString) -> Self {
        Self::PeerUnreachable {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` when the error means the peer could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::PeerUnreachable { .. })
    }
}

impl From<chordkv_transport::error::Error> for Error {
    fn from(e: chordkv_transport::error::Error) -> Self {
        use chordkv_transport::error::Error as TransportError;
        match e {
            TransportError::PeerUnreachable { address, reason } => {
                Self::PeerUnreachable { address, reason }
            }
            TransportError::ConnectionClosed(address) => {
                Self::unreachable(&address, "connection closed")
            }
            TransportError::ReplyTimeout(address) => Self::unreachable(&address, "reply timed out"),
            TransportError::NoReply(address) => {
                Self::MalformedMessage(format!("request dropped by {}", address))
            }
            TransportError::TransferTimeout(what) => Self::TransferTimeout(what),
            TransportError::Io(e) => Self::IOError(e),
            e => Self::Transport(e),
        }
    }
}
