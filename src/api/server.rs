use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use std::any::Any;
use std::sync::Arc;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::error::ApiError;

use crate::config::Config;
use crate::handlers::ocr_handler::ocr_document;
use crate::utils::document_intelligence::{DocumentAnalyzer, DocumentIntelligenceClient};
use crate::utils::url_validator::UrlValidator;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<UrlValidator>,
    pub analyzer: Arc<dyn DocumentAnalyzer>,
}

impl AppState {
    pub fn new(validator: UrlValidator, analyzer: Arc<dyn DocumentAnalyzer>) -> Self {
        Self {
            validator: Arc::new(validator),
            analyzer,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let validator = UrlValidator::new().context("failed to build URL probe client")?;
        let analyzer = DocumentIntelligenceClient::new(&config.backend)
            .context("failed to build Document Intelligence client")?;
        Ok(Self::new(validator, Arc::new(analyzer)))
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/ocr", post(ocr_document))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// Turns a panic inside a request into a 500 instead of a dropped connection.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    tracing::error!(panic = %message, "Request handler panicked");
    ApiError::Unexpected(message.to_string()).into_response()
}

/// Binds the listener and serves until Ctrl+C or SIGTERM.
pub async fn serve(config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let app = router(state, config.server.max_upload_bytes);

    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("OCR gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
