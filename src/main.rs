// Main entry point for the appraisal lot workflow

use appraisal_workflow::{
    core::{errors::JobError, types::*, Config},
    orchestration::JobOrchestrator,
    services::{HttpAnalysisClient, HttpObjectStore, HttpVinDecoder},
    utils::Metrics,
};

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<JobOrchestrator>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().expect("Failed to load configuration"));

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "appraisal_workflow={}",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== APPRAISAL LOT WORKFLOW ===");
    info!(
        "Config: caps={}/{} upload_pool={} keys={}",
        config.analysis_cap(false),
        config.analysis_cap(true),
        config.upload_concurrency(),
        config.api_keys().len()
    );

    // Initialize metrics
    let metrics = Metrics::new();

    // Initialize collaborator clients and the orchestrator
    let analysis = Arc::new(HttpAnalysisClient::new(
        config.clone(),
        None,
        Some(metrics.clone()),
    )?);
    let store = Arc::new(HttpObjectStore::new(
        config.storage.base_url.clone(),
        config.storage.timeout_seconds,
        Some(metrics.clone()),
    )?);
    let vin_decoder = Arc::new(HttpVinDecoder::new(
        config.vin.decode_url.clone(),
        Some(metrics.clone()),
    )?);

    let orchestrator = Arc::new(JobOrchestrator::new(
        config.clone(),
        analysis,
        store,
        vin_decoder,
        metrics.clone(),
    ));
    let state = AppState {
        orchestrator,
        metrics,
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create router with monitoring endpoints
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/appraise", post(submit_job))
        .route("/progress/:job_id", get(job_progress))
        .route("/report/:job_id", get(job_report))
        .with_state(state)
        .layer(DefaultBodyLimit::max(200 * 1024 * 1024)) // 200MB for large submissions
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /                   - Root endpoint");
    info!("  GET  /health             - Health check");
    info!("  GET  /metrics            - Prometheus metrics");
    info!("  GET  /stats              - Detailed statistics");
    info!("  POST /appraise           - Submit appraisal job (multipart/form-data)");
    info!("  GET  /progress/:job_id   - Job progress snapshot");
    info!("  GET  /report/:job_id     - Finished report");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Appraisal Lot Workflow"
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}

/// Submit an appraisal job
///
/// # Request Format:
/// - multipart/form-data
/// - Field "images": One or more image files (PNG/JPEG), in array order
/// - Field "config" (optional): JSON with declarations, locale, currency,
///   and an optional caller-supplied job_id
///
/// # Response:
/// - 202 with the job id; poll /progress/:job_id for the outcome
async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    info!("Received appraisal submission");

    let mut images = Vec::new();
    let mut job_config = JobConfig::default();

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "images" => {
                let filename = field.file_name().unwrap_or("unknown.jpg").to_string();

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("Read error: {}", e)))?;

                // Load image to validate and get dimensions
                let img = image::load_from_memory(&data)
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid image: {}", e)))?;

                images.push(UploadedImage {
                    index: images.len(),
                    original_name: filename,
                    bytes: Arc::new(data.to_vec()),
                    width: img.width(),
                    height: img.height(),
                });
            }
            "config" => {
                let config_data = field.text().await.map_err(|e| {
                    (StatusCode::BAD_REQUEST, format!("Config read error: {}", e))
                })?;

                job_config = serde_json::from_str(&config_data).map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Invalid config JSON: {}", e),
                    )
                })?;
            }
            _ => {}
        }
    }

    if images.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No images provided".to_string()));
    }

    info!(
        "Submitting job with {} images, {} declarations",
        images.len(),
        job_config.declarations.len()
    );

    let job_id = state
        .orchestrator
        .submit(images, job_config)
        .map_err(|e| match e {
            JobError::DuplicateJob(_) => (StatusCode::CONFLICT, e.to_string()),
            _ => {
                error!("Submission rejected: {:?}", e);
                (StatusCode::BAD_REQUEST, e.to_string())
            }
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "job_id": job_id })),
    ))
}

/// Progress polling; a missing job id is 404, distinct from a pending record
async fn job_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<appraisal_workflow::ProgressRecord>, (StatusCode, String)> {
    state
        .orchestrator
        .progress(&job_id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("job {} not found", job_id)))
}

/// Finished report; 404 until the job succeeds
async fn job_report(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<AppraisalReport>, (StatusCode, String)> {
    state
        .orchestrator
        .report(&job_id)
        .map(Json)
        .ok_or((
            StatusCode::NOT_FOUND,
            format!("no finished report for job {}", job_id),
        ))
}
