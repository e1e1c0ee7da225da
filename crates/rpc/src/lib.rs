//! JSON-RPC surface of chordkv nodes and of the membership registry.
//!
//! Client operations (`get`, `put`, `append`, `delete`) go through [retry::Retry], which
//! resends a request whose reply does not arrive in time. Control calls are sent once.
#![warn(missing_docs)]
pub mod error;
pub mod jsonrpc;
pub mod method;
pub mod retry;
pub mod types;

pub use jsonrpc_core;

pub use self::jsonrpc::Client;
pub use self::jsonrpc::RpcError;
