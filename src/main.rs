//! Prescription OCR - scan an uploaded prescription image or PDF and pull out
//! the medicine, dosage, frequency and duration lines.

mod config;
mod error;
mod fields;
mod ingest;
mod media;
mod ocr;
mod pipeline;
mod schema;
mod scratch;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    response::Json,
    routing::{get, post},
    Router,
};
use config::ServiceConfig;
use error::ScanError;
use ingest::{Ingestor, RawDocument};
use media::MediaKind;
use pipeline::Scanner;
use schema::{LegacyScanResponse, ProcessResponse};
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    scanner: Arc<Scanner>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "prescription_ocr=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env()?;
    info!("Loaded config: {:?}", config);

    // The engine is built once and shared read-only by every request
    let engine = ocr::build_engine(&config).await?;
    info!("OCR engine ready: {}", engine.name());

    let scanner = Scanner::new(
        Ingestor::new(&config.pdftoppm_bin, config.pdf_dpi),
        engine,
        config.scratch_dir.clone(),
    );
    let state = AppState {
        scanner: Arc::new(scanner),
    };

    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/process", post(process_document))
        .route("/v1/process", post(process_document))
        .route("/prescription/scan", post(scan_prescription))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Liveness string.
async fn home(State(state): State<AppState>) -> String {
    format!(
        "Prescription OCR API with {} is running",
        state.scanner.engine_name()
    )
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Scan an upload and return the canonical schema.
async fn process_document(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ProcessResponse>, ScanError> {
    let doc = read_upload(multipart).await?;
    let output = state.scanner.scan(doc).await?;
    Ok(Json(ProcessResponse::from(output)))
}

/// Scan an upload and return the legacy schema.
async fn scan_prescription(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<LegacyScanResponse>, ScanError> {
    let doc = read_upload(multipart).await?;
    let output = state.scanner.scan(doc).await?;
    Ok(Json(LegacyScanResponse::from(output)))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Read the `file` field. Its type is checked before the body is read.
///
/// A request that is not multipart at all has no `file` either.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<RawDocument, ScanError> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!("Not a multipart upload: {}", rejection.body_text());
            return Err(ScanError::NoFileUploaded);
        }
    };

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);

        // Browsers send an empty, unnamed part when no file was picked
        let untyped = content_type
            .as_deref()
            .map_or(true, |ct| ct.eq_ignore_ascii_case("application/octet-stream"));
        if filename.is_empty() && untyped {
            continue;
        }

        let kind = MediaKind::resolve(content_type.as_deref(), Some(filename.as_str()))?;
        let data = field.bytes().await?.to_vec();

        info!("Received file: {} ({} bytes, {:?})", filename, data.len(), kind);
        let filename = if filename.is_empty() {
            format!("upload.{}", kind.extension())
        } else {
            filename
        };
        return Ok(RawDocument {
            filename,
            kind,
            data,
        });
    }

    Err(ScanError::NoFileUploaded)
}
