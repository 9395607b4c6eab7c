//! HTTP adapter over [`TaskPipeline`] (feature `server`).
//!
//! | Method | Path | |
//! |--------|------|---|
//! | `POST` | `/upload` | multipart `file`; 202 with the new task id |
//! | `GET` | `/convert/status/{id}` | task view, `pdfUrl` once converted |
//! | `POST` | `/convert/start/{id}` | queue a `received` task |
//! | `GET` | `/download/{id}` | streamed `application/pdf` |
//! | `GET` | `/queue/status` | `{pendingCount, isProcessing}` |
//! | `GET` | `/tasks` | every task, oldest first |
//! | `DELETE` | `/tasks/{id}` | remove a finished task and its files |
//!
//! Anything else falls through to the static directory, when one is set.

mod error;
pub mod routes;

pub use error::ApiError;

use crate::ingress::UploadStore;
use crate::pipeline::TaskPipeline;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: TaskPipeline,
    pub uploads: UploadStore,
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(pipeline: TaskPipeline, uploads: UploadStore) -> Self {
        Self {
            pipeline,
            uploads,
            static_dir: None,
        }
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(state.uploads.max_file_size())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut app = Router::new()
        .route("/upload", post(routes::upload))
        .route("/convert/status/{id}", get(routes::status))
        .route("/convert/start/{id}", post(routes::start))
        .route("/download/{id}", get(routes::download))
        .route("/queue/status", get(routes::queue_status))
        .route("/tasks", get(routes::list_tasks))
        .route("/tasks/{id}", delete(routes::delete_task));

    if let Some(dir) = &state.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let pipeline = state.pipeline.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    let queue = pipeline.queue_status();
    if queue.is_processing {
        warn!(
            "Shutting down with {} queued task(s) and a conversion in progress",
            queue.pending_count
        );
    }
    info!("HTTP server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}
