//! JSON-RPC endpoint of a chordkv node or of the registry.
#![warn(missing_docs)]
mod http_error;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use jsonrpc_core::MetaIoHandler;
use tower_http::cors::CorsLayer;

use self::http_error::HttpError;
use crate::processor::Processor;
use crate::rpc_impl::RpcHandler;

/// JSON-RPC state
pub struct JsonRpcState<H: RpcHandler> {
    handler: Arc<H>,
    io_handler: MetaIoHandler<Arc<H>, RpcMiddleware>,
}

/// Status state
#[derive(Clone)]
pub struct StatusState {
    processor: Arc<Processor>,
}

/// Hands every method call to the [RpcHandler] carried as metadata.
pub struct RpcMiddleware;

fn jsonrpc_router<H: RpcHandler>(handler: Arc<H>) -> Router {
    let jsonrpc_state = Arc::new(JsonRpcState {
        handler,
        io_handler: MetaIoHandler::with_middleware(RpcMiddleware),
    });
    Router::new().route("/", post(jsonrpc_io_handler::<H>).with_state(jsonrpc_state))
}

async fn serve(router: Router, listener: std::net::TcpListener) -> anyhow::Result<()> {
    let axum_make_service = router
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(node_info_header))
        .into_make_service();

    axum::Server::from_tcp(listener)?
        .serve(axum_make_service)
        .await?;
    Ok(())
}

fn bind(addr: &str) -> anyhow::Result<std::net::TcpListener> {
    let binding_addr: SocketAddr = addr.parse()?;
    let listener = std::net::TcpListener::bind(binding_addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Serve the node api on an already bound listener.
pub async fn serve_node_api(
    listener: std::net::TcpListener,
    processor: Arc<Processor>,
) -> anyhow::Result<()> {
    let status_state = Arc::new(StatusState {
        processor: processor.clone(),
    });
    let router = jsonrpc_router(processor)
        .route("/status", get(status_handler).with_state(status_state));
    serve(router, listener).await
}

/// Serve the registry api on an already bound listener.
pub async fn serve_registry_api<H: RpcHandler>(
    listener: std::net::TcpListener,
    registry: Arc<H>,
) -> anyhow::Result<()> {
    serve(jsonrpc_router(registry), listener).await
}

/// Run a web server handling the JSON-RPC requests of a node on `addr`.
pub async fn run_node_api(addr: &str, processor: Arc<Processor>) -> anyhow::Result<()> {
    let listener = bind(addr)?;
    println!("JSON-RPC endpoint: http://{addr}");
    serve_node_api(listener, processor).await
}

/// Run a web server handling the JSON-RPC requests of the registry on `addr`.
pub async fn run_registry_api<H: RpcHandler>(addr: &str, registry: Arc<H>) -> anyhow::Result<()> {
    let listener = bind(addr)?;
    println!("Registry endpoint: http://{addr}");
    serve_registry_api(listener, registry).await
}

async fn jsonrpc_io_handler<H: RpcHandler>(
    State(state): State<Arc<JsonRpcState<H>>>,
    body: String,
) -> Result<JsonResponse, HttpError> {
    let r = state
        .io_handler
        .handle_request(&body, state.handler.clone())
        .await
        .ok_or(HttpError::BadRequest)?;
    Ok(JsonResponse(r))
}

async fn node_info_header<B>(
    req: http::Request<B>,
    next: axum::middleware::Next<B>,
) -> axum::response::Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    if let Ok(version) = http::HeaderValue::from_str(crate::util::build_version().as_str()) {
        headers.insert("X-NODE-VERSION", version);
    }
    res
}

async fn status_handler(
    State(state): State<Arc<StatusState>>,
) -> Result<axum::Json<chordkv_core::inspect::NodeInspect>, HttpError> {
    let info = state
        .processor
        .node_info()
        .await
        .map_err(|_| HttpError::Internal)?;
    Ok(axum::Json(info))
}

/// JSON response struct
#[derive(Debug, Clone)]
pub struct JsonResponse(String);

impl IntoResponse for JsonResponse {
    fn into_response(self) -> axum::response::Response {
        ([("content-type", "application/json")], self.0).into_response()
    }
}

mod jsonrpc_middleware_impl {
    use std::future::Future;

    use chordkv_rpc::method::Method;
    use jsonrpc_core::futures_util::future;
    use jsonrpc_core::futures_util::future::Either;
    use jsonrpc_core::futures_util::FutureExt;
    use jsonrpc_core::middleware::NoopCallFuture;
    use jsonrpc_core::middleware::NoopFuture;
    use jsonrpc_core::*;

    use super::*;

    impl<H: RpcHandler> Middleware<Arc<H>> for RpcMiddleware {
        type Future = NoopFuture;
        type CallFuture = NoopCallFuture;

        fn on_call<F, X>(&self, call: Call, meta: Arc<H>, next: F) -> Either<Self::CallFuture, X>
        where
            F: Fn(Call, Arc<H>) -> X + Send + Sync,
            X: Future<Output = Option<Output>> + Send + 'static,
        {
            match call {
                Call::MethodCall(MethodCall {
                    jsonrpc,
                    method,
                    params,
                    id,
                }) => {
                    let fut = async move {
                        match Method::try_from(method.as_str()) {
                            Ok(method) => meta.handle_request(method, params).await,
                            Err(_) => Err(Error::method_not_found()),
                        }
                    }
                    .then(move |res| future::ready(Some(Output::from(res, id, jsonrpc))));
                    Either::Left(Box::pin(fut))
                }
                _ => Either::Left(Box::pin(next(call, meta))),
            }
        }
    }
}
