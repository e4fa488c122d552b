use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::configuration::BackendConfiguration;
use crate::error::ServiceError;
use crate::form::FormRecord;
use crate::graph::GraphClient;
use crate::pdf;

/// The most a request body may carry, which also bounds the size of an uploaded file.
const REQUEST_BODY_LIMIT: usize = 15 * 1024 * 1024;

/// The state shared by every request: the configuration and the outbound client. Nothing
/// in it is mutable, so requests never contend with each other.
#[derive(Clone)]
pub struct AppState {
    pub configuration: Arc<BackendConfiguration>,
    pub graph_client: Arc<GraphClient>,
}

impl AppState {
    pub fn new(configuration: BackendConfiguration) -> Self {
        let graph_client = Arc::new(GraphClient::new(&configuration));
        AppState {
            configuration: Arc::new(configuration),
            graph_client,
        }
    }
}

/// The success envelope of both upload paths. The optional members are dropped from the
/// JSON instead of being serialized as null, matching what the form frontends expect.
#[derive(Debug, Serialize)]
struct UploadResponse {
    ok: bool,
    #[serde(rename = "webUrl", skip_serializing_if = "Option::is_none")]
    web_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

/// The error envelope shared by every failure path.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Auth(_)
            | ServiceError::Upload(_)
            | ServiceError::ImageDecode(_)
            | ServiceError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        log::error!("Request failed: {}", self);

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Assemble the router of the backend with its CORS and body-limit layers applied.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.configuration.allowed_origins);

    Router::new()
        .route("/", get(liveness))
        .route("/upload", post(upload_pdf))
        .route("/generate-pdf-editable", post(generate_pdf_editable))
        .layer(cors)
        .layer(DefaultBodyLimit::max(REQUEST_BODY_LIMIT))
        .with_state(state)
}

/// An empty configured origin list allows every origin; otherwise only the listed ones.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if allowed_origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring the malformed allowed origin {:?}", origin);
                    None
                }
            })
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

async fn liveness() -> &'static str {
    "✅ Backend funcionando"
}

/// The raw upload path: the file attached under the multipart field `pdf` is pushed to the
/// drive unchanged, keeping its original filename.
async fn upload_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServiceError> {
    let mut attached_file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ServiceError::Validation(error.to_string()))?
    {
        if field.name() == Some("pdf") {
            let filename = field.file_name().unwrap_or("upload.pdf").to_string();
            let contents = field
                .bytes()
                .await
                .map_err(|error| ServiceError::Validation(error.to_string()))?;
            attached_file = Some((filename, contents.to_vec()));
        }
    }

    let (filename, contents) =
        attached_file.ok_or_else(|| ServiceError::Validation("Falta pdf".into()))?;

    let access_token = state.graph_client.fetch_access_token().await?;
    let uploaded = state
        .graph_client
        .upload(
            &access_token,
            contents,
            &filename,
            &state.configuration.folder_path,
        )
        .await?;
    log::info!("Uploaded {} to the drive", filename);

    Ok(Json(UploadResponse {
        ok: true,
        web_url: uploaded.web_url,
        name: uploaded.name,
    }))
}

/// The generate path: the JSON body is validated into a `FormRecord`, rendered into an
/// editable PDF and pushed to the drive under a filename derived from the claim number.
async fn generate_pdf_editable(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Json<UploadResponse>, ServiceError> {
    let record: FormRecord = serde_json::from_slice(&body)
        .map_err(|error| ServiceError::Validation(format!("Invalid form record: {}", error)))?;

    let pdf_bytes = pdf::build_form_pdf(&record)?;

    let timestamp_milliseconds =
        time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let filename = record.derive_filename(timestamp_milliseconds);

    let access_token = state.graph_client.fetch_access_token().await?;
    let uploaded = state
        .graph_client
        .upload(
            &access_token,
            pdf_bytes,
            &filename,
            &state.configuration.folder_path,
        )
        .await?;
    log::info!("Generated and uploaded {} to the drive", filename);

    Ok(Json(UploadResponse {
        ok: true,
        web_url: uploaded.web_url,
        name: uploaded.name,
    }))
}
