//! Native surfaces of the node: configuration file and JSON-RPC endpoint.
pub mod config;
pub mod endpoint;
