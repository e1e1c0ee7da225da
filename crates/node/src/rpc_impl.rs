//! Dispatch of JSON-RPC calls to a [Processor] or to a [Registry].
use std::sync::Arc;

use async_trait::async_trait;
use chordkv_rpc::method::Method;
use chordkv_rpc::types::ActiveNodesResponse;
use chordkv_rpc::types::Args;
use chordkv_rpc::types::NodeAddressRequest;
use jsonrpc_core::Params;
use jsonrpc_core::Result;
use jsonrpc_core::Value;
use serde::Serialize;

use crate::error::Error;
use crate::processor::Processor;
use crate::registry::Registry;

/// A service reachable through the JSON-RPC endpoint.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Answer one call. Methods the service does not serve are rejected with
    /// [Error::InvalidMethod].
    async fn handle_request(self: Arc<Self>, method: Method, params: Params) -> Result<Value>;
}

fn to_value<T: Serialize>(v: T) -> Result<Value> {
    serde_json::to_value(v).map_err(|e| Error::SerdeJsonError(e).into())
}

#[async_trait]
impl RpcHandler for Processor {
    async fn handle_request(self: Arc<Self>, method: Method, params: Params) -> Result<Value> {
        tracing::debug!("rpc call {}", method.as_str());
        match method {
            Method::Get => to_value(self.get(&params.parse::<Args>()?).await?),
            Method::Put => to_value(self.put(&params.parse::<Args>()?).await?),
            Method::Append => to_value(self.append(&params.parse::<Args>()?).await?),
            Method::Delete => to_value(self.delete(&params.parse::<Args>()?).await?),
            Method::Join => to_value(self.join(&params.parse::<Args>()?).await?),
            Method::Leave => to_value(self.leave().await?),
            Method::StartReconciliation => to_value(self.start_reconciliation().await?),
            Method::NodeInfo => to_value(self.node_info().await?),
            _ => Err(Error::InvalidMethod.into()),
        }
    }
}

#[async_trait]
impl RpcHandler for Registry {
    async fn handle_request(self: Arc<Self>, method: Method, params: Params) -> Result<Value> {
        tracing::debug!("registry call {}", method.as_str());
        match method {
            Method::RegisterNode => {
                let req: NodeAddressRequest = params.parse()?;
                to_value(ActiveNodesResponse {
                    nodes: self.register(&req.address),
                })
            }
            Method::ActiveNodes => to_value(ActiveNodesResponse {
                nodes: self.active_nodes(),
            }),
            Method::TerminateNode => {
                let req: NodeAddressRequest = params.parse()?;
                to_value(self.terminate(&req.address)?)
            }
            _ => Err(Error::InvalidMethod.into()),
        }
    }
}
