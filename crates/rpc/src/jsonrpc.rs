//! chordkv-rpc client

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::method::Method;
use crate::retry::Retry;
use crate::types::*;

/// Wrap json_client send request to a node or to the registry.
pub struct Client {
    client: HttpClient,
    endpoint_url: String,
    retry: Retry,
    timeout: Option<Duration>,
}

/// The errors returned by the client.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// An error returned by the server.
    #[error("Server returned rpc error {0}")]
    JsonClientError(jsonrpc_core::Error),
    /// Failure to parse server response.
    #[error("Failed to parse server response as {0}: {1}")]
    ParseError(String, Box<dyn std::error::Error + Send + Sync>),
    /// Request timed out.
    #[error("Request timed out")]
    Timeout,
    /// A general client error.
    #[error("Client error: {0}")]
    Client(String),
    /// No reply after every retransmission.
    #[error("Server unreachable after {0} attempts")]
    ServerUnreachable(usize),
    /// Not rpc specific errors.
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl RpcError {
    /// Failures that say nothing about the server having processed the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Timeout | RpcError::Client(_))
    }
}

fn send_error(e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout
    } else {
        RpcError::Client(e.to_string())
    }
}

/// A wrap `Result` contains ClientError.
type Result<T> = std::result::Result<T, RpcError>;

impl Client {
    /// Creates a new Client instance with the specified endpoint URL
    pub fn new(endpoint_url: &str) -> Self {
        Self {
            client: HttpClient::default(),
            endpoint_url: endpoint_url.to_string(),
            retry: Retry::default(),
            timeout: None,
        }
    }

    /// Use `retry` for the client operations.
    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    /// Give up on every single call after `timeout`, answering [RpcError::Timeout].
    ///
    /// Without it a call waits for as long as the server holds the connection, which
    /// suits the client operations whose attempts are bounded by the [Retry] gateway.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The endpoint this client talks to.
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Send one JSON-RPC call with `req` as named params.
    pub async fn call_method<T>(&self, method: Method, req: &impl Serialize) -> Result<T>
    where T: DeserializeOwned {
        use jsonrpc_core::*;

        let params = serde_json::to_value(req)
            .map_err(|e| RpcError::Client(e.to_string()))?
            .as_object()
            .ok_or(RpcError::Client("params should be an object".to_string()))?
            .clone();

        let jsonrpc_request = Request::Single(Call::MethodCall(MethodCall {
            jsonrpc: Some(Version::V2),
            method: method.to_string(),
            params: Params::Map(params),
            id: Id::Num(1),
        }));

        let result = self.do_jsonrpc_request(&jsonrpc_request).await?;
        serde_json::from_value(result).map_err(|e| RpcError::ParseError(e.to_string(), Box::new(e)))
    }

    async fn do_jsonrpc_request(&self, req: &jsonrpc_core::Request) -> Result<serde_json::Value> {
        let body = serde_json::to_string(req).map_err(|e| RpcError::Client(e.to_string()))?;

        let mut req = self
            .client
            .post(self.endpoint_url.as_str())
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .body(body);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let resp = req
            .send()
            .await
            .map_err(send_error)?
            .error_for_status()
            .map_err(|e| RpcError::Client(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| match e.is_timeout() {
                true => RpcError::Timeout,
                false => RpcError::ParseError(e.to_string(), Box::new(e)),
            })?;

        let jsonrpc_resp = jsonrpc_core::Response::from_json(&String::from_utf8_lossy(&resp))
            .map_err(|e| RpcError::ParseError(e.to_string(), Box::new(e)))?;

        match jsonrpc_resp {
            jsonrpc_core::Response::Single(resp) => match resp {
                jsonrpc_core::Output::Success(success) => Ok(success.result),
                jsonrpc_core::Output::Failure(failure) => {
                    Err(RpcError::JsonClientError(failure.error))
                }
            },
            jsonrpc_core::Response::Batch(_) => Err(RpcError::Client(
                "Batch response is not supported".to_string(),
            )),
        }
    }

    async fn call_with_retry(&self, method: Method, args: &Args) -> Result<String> {
        self.retry
            .run(move || self.call_method(method, args))
            .await
    }

    /// Reads `args.key` through the node, retransmitting on timeout.
    pub async fn get(&self, args: &Args) -> Result<String> {
        self.call_with_retry(Method::Get, args).await
    }

    /// Stores `args.value` under `args.key`, retransmitting on timeout.
    pub async fn put(&self, args: &Args) -> Result<String> {
        self.call_with_retry(Method::Put, args).await
    }

    /// Appends `args.value` to `args.key`, retransmitting on timeout. A retransmission
    /// that reaches the owner appends the value again.
    pub async fn append(&self, args: &Args) -> Result<String> {
        self.call_with_retry(Method::Append, args).await
    }

    /// Deletes `args.key` on every node, retransmitting on timeout.
    pub async fn delete(&self, args: &Args) -> Result<String> {
        self.call_with_retry(Method::Delete, args).await
    }

    /// Tells the node that `new_node` joined right after it.
    pub async fn join(&self, new_node: &str) -> Result<String> {
        let args = Args {
            value: new_node.to_string(),
            ..Default::default()
        };
        self.call_method(Method::Join, &args).await
    }

    /// Asks the node to hand its collection over before termination.
    pub async fn leave(&self) -> Result<String> {
        self.call_method(Method::Leave, &EmptyRequest::default())
            .await
    }

    /// Starts a reconciliation walk at the node.
    pub async fn start_reconciliation(&self) -> Result<String> {
        self.call_method(Method::StartReconciliation, &EmptyRequest::default())
            .await
    }

    /// Query for node inspect info.
    pub async fn node_info(&self) -> Result<NodeInspect> {
        self.call_method(Method::NodeInfo, &EmptyRequest::default())
            .await
    }

    /// Announces the node at `address` to the registry.
    pub async fn register_node(&self, address: &str) -> Result<ActiveNodesResponse> {
        let req = NodeAddressRequest {
            address: address.to_string(),
        };
        self.call_method(Method::RegisterNode, &req).await
    }

    /// Nodes the registry believes alive.
    pub async fn active_nodes(&self) -> Result<ActiveNodesResponse> {
        self.call_method(Method::ActiveNodes, &EmptyRequest::default())
            .await
    }

    /// Marks the node at `address` as terminating.
    pub async fn terminate_node(&self, address: &str) -> Result<String> {
        let req = NodeAddressRequest {
            address: address.to_string(),
        };
        self.call_method(Method::TerminateNode, &req).await
    }
}
