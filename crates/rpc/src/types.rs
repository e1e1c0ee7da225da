//! Request and response records of the JSON-RPC surface.
pub use chordkv_core::inspect::NodeInspect;
pub use chordkv_core::replica::Args;
use serde::Deserialize;
use serde::Serialize;

/// Params of methods that take none. JSON-RPC params travel as an object.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EmptyRequest {}

/// Params of `registerNode` and `terminateNode`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeAddressRequest {
    /// Ring address of the node, `host:port`.
    pub address: String,
}

/// Reply of `activeNodes`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveNodesResponse {
    /// Ring addresses of the nodes the registry believes alive.
    pub nodes: Vec<String>,
}
