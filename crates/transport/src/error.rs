#![allow(missing_docs)]

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Peer {address} unreachable: {reason}")]
    PeerUnreachable { address: String, reason: String },

    #[error("Connection to {0} closed before a reply arrived")]
    ConnectionClosed(String),

    #[error("No reply from {0} within the request timeout")]
    ReplyTimeout(String),

    #[error("Peer {0} dropped the request without answering")]
    NoReply(String),

    #[error("Invalid bulk transfer header: {0}")]
    InvalidHeader(String),

    #[error("Bulk transfer timed out: {0}")]
    TransferTimeout(String),

    #[error("Payload of {0} bytes does not fit in a bulk transfer header")]
    PayloadTooLarge(usize),
}

impl Error {
    pub fn unreachable(address: &str, reason: impl ToString) -> Self {
        Self::PeerUnreachable {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }
}
