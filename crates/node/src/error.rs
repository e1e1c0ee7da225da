//! A bunch of wrap errors.

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors enum mapping global custom errors.
/// The error type can be expressed in decimal, where the high decs represent
/// the error category and the low decs represent the error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
#[repr(u32)]
pub enum Error {
    #[error("Connect remote rpc server failed: {0}.")]
    RemoteRpcError(String) = 100,
    #[error("Unknown rpc error.")]
    UnknownRpcError = 101,
    #[error("Internal rpc services error: {0}.")]
    InternalRpcError(#[from] jsonrpc_core::Error) = 102,
    #[error("Invalid method.")]
    InvalidMethod = 501,
    #[error("Ring error: {0}")]
    RingError(chordkv_core::error::Error) = 600,
    #[error("Join ring failed: {0}")]
    JoinError(chordkv_core::error::Error) = 601,
    #[error("Storage Error: {0}")]
    Storage(chordkv_core::error::Error) = 807,
    #[error("Invalid logging level: {0}")]
    InvalidLoggingLevel(String) = 809,
    #[error("Unknown node: {0}")]
    UnknownNode(String) = 810,
    #[error("Create File Error: {0}")]
    CreateFileError(String) = 900,
    #[error("Open File Error: {0}")]
    OpenFileError(String) = 901,
    #[error("Cannot find home directory")]
    HomeDirError = 903,
    #[error("Cannot find parent directory")]
    ParentDirError = 904,
    #[error("Serde json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error) = 1000,
    #[error("Serde yaml error: {0}")]
    SerdeYamlError(#[from] serde_yaml::Error) = 1001,
    #[error("Core error: {0}")]
    CoreError(#[from] chordkv_core::error::Error) = 1102,
}

impl Error {
    fn discriminant(&self) -> u32 {
        // SAFETY: Because `Self` is marked `repr(u32)`, its layout is a `repr(C)` `union`
        // between `repr(C)` structs, each of which has the `u32` discriminant as its first
        // field, so we can read the discriminant without offsetting the pointer.
        // ref: https://doc.rust-lang.org/std/mem/fn.discriminant.html
        unsafe { *<*const _>::from(self).cast::<u32>() }
    }

    pub fn code(&self) -> u32 {
        self.discriminant()
    }
}

impl From<Error> for jsonrpc_core::Error {
    fn from(e: Error) -> Self {
        Self {
            code: jsonrpc_core::ErrorCode::ServerError(e.code().into()),
            message: e.to_string(),
            data: None,
        }
    }
}

impl From<chordkv_rpc::error::Error> for Error {
    fn from(e: chordkv_rpc::error::Error) -> Self {
        match e {
            chordkv_rpc::error::Error::InvalidMethod => Error::InvalidMethod,
            chordkv_rpc::error::Error::RpcError(v) => Error::RemoteRpcError(v.to_string()),
            _ => Error::UnknownRpcError,
        }
    }
}

impl From<chordkv_rpc::RpcError> for Error {
    fn from(e: chordkv_rpc::RpcError) -> Self {
        Error::RemoteRpcError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = Error::RemoteRpcError("Test".to_string());
        assert_eq!(err.code(), 100);
        let err = Error::Storage(chordkv_core::error::Error::EntryNotFound("k".into()));
        assert_eq!(err.code(), 807);
    }

    #[test]
    fn test_jsonrpc_error_carries_code() {
        let err: jsonrpc_core::Error = Error::InvalidMethod.into();
        assert_eq!(err.code, jsonrpc_core::ErrorCode::ServerError(501));
        assert_eq!(err.message, "Invalid method.");
    }
}
