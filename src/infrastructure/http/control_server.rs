//! HTTP control surface of a running agent.
//!
//! Pipeline failures are never reported through status codes; they only show
//! up in the logs. Only malformed input is rejected.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::domain::models::HttpServerConfig;
use crate::services::dump_pipeline::DumpPipeline;

pub struct ControlServer {
    pipeline: Arc<DumpPipeline>,
}

impl ControlServer {
    pub fn new(pipeline: Arc<DumpPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/partition", get(get_partition).post(reject_empty_partition))
            .route("/partition/", post(reject_empty_partition))
            .route("/partition/{name}", post(set_partition))
            .route("/dump", post(dump))
            .route("/reset", post(reset))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.pipeline))
    }

    /// Bind the configured address; port 0 picks a free port
    pub async fn bind(config: &HttpServerConfig) -> io::Result<TcpListener> {
        TcpListener::bind((config.host.as_str(), config.port)).await
    }

    /// Serve on `listener` until `shutdown` completes
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: Option<SocketAddr> = listener.local_addr().ok();
        info!(address = ?addr, "Control server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn get_partition(State(pipeline): State<Arc<DumpPipeline>>) -> String {
    pipeline.partition().await.unwrap_or_default()
}

async fn dump(State(pipeline): State<Arc<DumpPipeline>>) -> StatusCode {
    let outcome = pipeline.trigger_dump().await;
    info!(outcome = ?outcome, "Dump triggered over HTTP");
    StatusCode::NO_CONTENT
}

async fn reset(State(pipeline): State<Arc<DumpPipeline>>) -> StatusCode {
    if let Err(err) = pipeline.reset().await {
        warn!(error = %err, "Reset triggered over HTTP failed");
    }
    StatusCode::NO_CONTENT
}

async fn set_partition(
    State(pipeline): State<Arc<DumpPipeline>>,
    Path(name): Path<String>,
) -> (StatusCode, String) {
    let name = name.trim();
    if name.is_empty() {
        return empty_partition();
    }

    info!(partition = %name, "Changing partition");
    if let Err(err) = pipeline.set_partition(name).await {
        warn!(error = %err, partition = %name, "Failed to forward partition to the recording runtime");
    }
    (StatusCode::NO_CONTENT, String::new())
}

async fn reject_empty_partition() -> (StatusCode, String) {
    empty_partition()
}

fn empty_partition() -> (StatusCode, String) {
    (
        StatusCode::BAD_REQUEST,
        "The new partition name is missing in the request path".to_string(),
    )
}
