//! HTTP surface for the function platform: routing, request/response
//! marshaling, and the error-to-status mapping over `faas-core`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use faas_core::{unix_now, Config, FunctionMetadata, InMemoryRegistry, Pipeline, Registry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Pipeline(#[from] faas_core::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        use faas_core::Error as PipelineError;

        let (status, message) = match &self {
            ServerError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ServerError::Pipeline(err) => match err {
                PipelineError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                PipelineError::TooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, err.to_string()),
                PipelineError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, err.to_string()),
                err if err.is_client_fault() => (StatusCode::BAD_REQUEST, err.to_string()),
                // Captured toolchain output goes back to the caller for
                // diagnostics.
                PipelineError::BuildFailed(_) | PipelineError::ExecutionFailed(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
                err => {
                    error!(error = %err, "internal error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_string(),
                    )
                }
            },
        };

        (
            status,
            Json(json!({ "error": message, "code": status.as_u16() })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub function_id: String,
    pub image_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub output: String,
    pub status_code: u16,
    pub executed_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub function_id: Option<String>,
    #[serde(default)]
    pub input: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteParams {
    pub function_id: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    registry: Arc<dyn Registry>,
}

pub fn create_app(config: Config) -> Router {
    create_app_with_registry(config, Arc::new(InMemoryRegistry::new()))
}

/// Build the router over an injected registry; tests substitute their
/// own.
pub fn create_app_with_registry(config: Config, registry: Arc<dyn Registry>) -> Router {
    // Multipart framing overhead means the archive ceiling is enforced
    // by the pipeline, not the transport; the body limit only has to be
    // comfortably above it.
    let body_limit = (config.max_upload_size as usize).saturating_mul(2);
    let pipeline = Pipeline::new(config, registry.clone());

    let state = AppState {
        pipeline: Arc::new(pipeline),
        registry,
    };

    Router::new()
        .route("/api/submit", post(submit))
        .route("/api/execute", get(execute_query).post(execute_body))
        .route("/api/functions", get(list_functions))
        .route("/api/functions/:id", get(get_function).delete(delete_function))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> std::io::Result<()> {
    info!("starting function platform server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmissionResponse>, ServerError> {
    let mut code = None;
    let mut name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let field_name = field.name().map(|name| name.to_string());
        match field_name.as_deref() {
            Some("code") => {
                let filename = field.file_name().unwrap_or("upload.zip").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(e.to_string()))?;
                code = Some((filename, data));
            }
            Some("name") => {
                name = field.text().await.ok();
            }
            _ => {}
        }
    }

    let (filename, data) =
        code.ok_or_else(|| ServerError::BadRequest("missing 'code' archive field".to_string()))?;
    let name = name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "unnamed-function".to_string());

    let mut body = data.as_ref();
    let metadata = state.pipeline.submit(&filename, &mut body, &name).await?;

    Ok(Json(SubmissionResponse {
        function_id: metadata.function_id,
        image_id: metadata.image_id,
        message: format!("Function '{}' deployed successfully", name),
    }))
}

async fn execute_query(
    State(state): State<AppState>,
    Query(params): Query<ExecuteParams>,
) -> Result<Json<ExecutionResponse>, ServerError> {
    let function_id = params.function_id.ok_or_else(|| {
        ServerError::BadRequest("the 'functionId' query parameter is required".to_string())
    })?;
    run_function(&state, &function_id, None).await
}

async fn execute_body(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecutionResponse>, ServerError> {
    let function_id = request.function_id.ok_or_else(|| {
        ServerError::BadRequest("the 'functionId' field is required".to_string())
    })?;
    run_function(&state, &function_id, request.input.as_ref()).await
}

async fn run_function(
    state: &AppState,
    function_id: &str,
    input: Option<&HashMap<String, String>>,
) -> Result<Json<ExecutionResponse>, ServerError> {
    let execution = state.pipeline.execute(function_id, input).await?;

    Ok(Json(ExecutionResponse {
        output: execution.output,
        status_code: StatusCode::OK.as_u16(),
        executed_at: execution.executed_at,
    }))
}

async fn list_functions(State(state): State<AppState>) -> Json<Vec<FunctionMetadata>> {
    Json(state.registry.list().await)
}

async fn get_function(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FunctionMetadata>, ServerError> {
    Ok(Json(state.registry.get(&id).await?))
}

async fn delete_function(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.registry.remove(&id).await?;
    Ok(Json(json!({
        "message": format!("Function {} deleted successfully", id)
    })))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "time": unix_now() }))
}
