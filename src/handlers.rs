use std::io;
use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Query, Request, State},
    http::Uri,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::AppState;
use crate::delivery;
use crate::error::ServeError;
use crate::resolver;
use crate::sink::{ChannelSink, ResponseSink};

/// Query parameters for the fetch endpoint
#[derive(Debug, Default, Deserialize)]
pub struct FetchQuery {
    /// Filesystem path to serve, used verbatim
    #[serde(default)]
    pub path: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Addressing details of one fetch, captured before delivery starts.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub remote_addr: String,
    pub hostname: String,
    pub host: String,
    pub path: String,
}

impl FetchRequest {
    fn from_request(request: &Request) -> Self {
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();

        let uri = request.uri();
        // A malformed query string counts as a missing path.
        let path = Query::<FetchQuery>::try_from_uri(uri)
            .map(|Query(query)| query.path.unwrap_or_default())
            .unwrap_or_default();

        Self {
            remote_addr,
            hostname: uri_hostname(uri),
            host: uri.authority().map(|a| a.to_string()).unwrap_or_default(),
            path,
        }
    }
}

/// Host without port or IPv6 brackets. Empty for origin-form request targets.
fn uri_hostname(uri: &Uri) -> String {
    uri.host()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .unwrap_or_default()
}

/// GET /health - Liveness check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /?path=... - Download a file, or a directory as a zip archive
///
/// Resolution and delivery run as blocking code on their own task; the
/// response head is returned as soon as the delivery commits it.
pub async fn fetch(State(state): State<AppState>, request: Request) -> Response {
    let fetch_request = FetchRequest::from_request(&request);
    let (sink, head_rx) = ChannelSink::new();

    tokio::task::spawn_blocking(move || serve_blocking(&state, fetch_request, sink));

    match head_rx.await {
        Ok(response) => response,
        Err(_) => {
            error!("delivery task ended without producing a response");
            ServeError::internal(
                "Internal server error",
                io::Error::other("delivery task aborted"),
            )
            .into_response()
        }
    }
}

/// Resolve and deliver one request into `sink`.
pub fn serve_blocking(state: &AppState, request: FetchRequest, mut sink: impl ResponseSink) {
    state.request_log.record(&[
        "ip",
        &request.remote_addr,
        &request.hostname,
        &request.host,
    ]);

    let target = match resolver::resolve(&request.path, state.allowed_root.as_deref()) {
        Ok(target) => target,
        Err(err) => {
            debug!("rejecting fetch of {:?}: {}", request.path, err);
            sink.fail(&err);
            return;
        }
    };

    state
        .request_log
        .record(&[&format!("filepath:{}", request.path)]);

    let strategy = delivery::strategy_for(target, &state.config);
    delivery::run(strategy.as_ref(), &mut sink);
}
