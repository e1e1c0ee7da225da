/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors enum mapping global custom errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Invalid method.")]
    InvalidMethod,
    #[error("Rpc error: {0}")]
    RpcError(crate::jsonrpc::RpcError),
}

impl From<crate::jsonrpc::RpcError> for Error {
    fn from(e: crate::jsonrpc::RpcError) -> Self {
        Self::RpcError(e)
    }
}
