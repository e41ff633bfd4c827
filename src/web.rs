//
// web.rs
// Dicom2Pdf-rs
//
// Axum-based HTTP server: upload an archive of DICOM files, convert it, download the PDF.
//

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::normalize::NormalizeOptions;
use crate::pipeline::{self, Conversion, ConversionConfig, PipelineError};
use crate::storage::{self, FileStore};
use crate::{image, metadata, stats};

#[derive(Clone)]
struct AppState {
    store: FileStore,
    defaults: ConversionConfig,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Server settings collected by the CLI.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub defaults: ConversionConfig,
}

/// Bootstraps the Axum HTTP server and wires up API routes.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    config.defaults.validate()?;
    let state = AppState {
        store: FileStore::new(&config.output_dir)?,
        defaults: config.defaults,
    };

    let app = router(state, config.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Server running at http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/convert", post(convert_handler))
        .route("/api/preview", post(preview_handler))
        .route("/api/inspect", post(inspect_handler))
        .route("/api/download/:filename", get(download_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
}

async fn root_handler() -> Html<&'static str> {
    Html(include_str!("templates/index.html"))
}

async fn convert_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut original_name = None;
    let mut data = None;
    let mut config = state.defaults.clone();

    // The archive arrives as "file"; "contrast" and "dpi" optionally override the server defaults.
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                original_name = field.file_name().map(|s| s.to_string());
                data = Some(field.bytes().await.map_err(bad_request)?);
            }
            Some("contrast") => {
                let text = field.text().await.map_err(bad_request)?;
                if !text.trim().is_empty() {
                    config.normalize.contrast_exponent =
                        text.trim().parse().map_err(bad_request)?;
                }
            }
            Some("dpi") => {
                let text = field.text().await.map_err(bad_request)?;
                if !text.trim().is_empty() {
                    config.dpi = text.trim().parse().map_err(bad_request)?;
                }
            }
            _ => {}
        }
    }

    let data = data.ok_or((StatusCode::BAD_REQUEST, "No file uploaded".to_string()))?;
    config.validate().map_err(bad_request)?;

    let upload_name = format!(
        "{}.{}",
        storage::stem_for(original_name.as_deref()),
        upload_extension(original_name.as_deref())
    );

    // Conversion is CPU bound; keep it off the async workers.
    let conversion = tokio::task::spawn_blocking(move || -> Result<Conversion, PipelineError> {
        let workspace = TempDir::new()?;
        let archive_path = workspace.path().join(upload_name);
        std::fs::write(&archive_path, &data)?;
        pipeline::convert_input(&archive_path, &config)
    })
    .await
    .map_err(internal_error)?
    .map_err(|e| {
        warn!("Conversion failed: {}", e);
        pipeline_status(e)
    })?;

    let saved_name = state
        .store
        .save(original_name.as_deref(), "pdf", &conversion.pdf)
        .map_err(internal_error)?;

    Ok(Json(json!({
        "success": true,
        "filename": saved_name,
        "pages": conversion.report.pages.len(),
        "report": conversion.report
    })))
}

async fn download_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let path = state.store.resolve(&filename).map_err(not_found)?;
    let bytes = tokio::fs::read(&path).await.map_err(internal_error)?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(internal_error)?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/pdf"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// One DICOM file posted as "file", kept in its own temp dir for the life of the request.
struct SingleUpload {
    _workspace: TempDir,
    path: PathBuf,
    options: NormalizeOptions,
}

async fn single_upload(defaults: &ConversionConfig, mut multipart: Multipart) -> ApiResult<SingleUpload> {
    let mut data = None;
    let mut options = defaults.normalize;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => data = Some(field.bytes().await.map_err(bad_request)?),
            Some("contrast") => {
                let text = field.text().await.map_err(bad_request)?;
                if !text.trim().is_empty() {
                    options.contrast_exponent = text.trim().parse().map_err(bad_request)?;
                }
            }
            _ => {}
        }
    }

    let data = data.ok_or((StatusCode::BAD_REQUEST, "No file uploaded".to_string()))?;
    options.validate().map_err(bad_request)?;

    let workspace = TempDir::new().map_err(internal_error)?;
    let path = workspace.path().join("upload.dcm");
    tokio::fs::write(&path, &data).await.map_err(internal_error)?;
    Ok(SingleUpload {
        _workspace: workspace,
        path,
        options,
    })
}

/// Normalized first frame of a single uploaded file, as PNG.
async fn preview_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let upload = single_upload(&state.defaults, multipart).await?;
    let bytes = tokio::task::spawn_blocking(move || {
        image::preview_png_bytes(&upload.path, &upload.options)
    })
    .await
    .map_err(internal_error)?
    .map_err(|e| unprocessable(format!("{:#}", e)))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

/// Caption fields and sample statistics of a single uploaded file.
async fn inspect_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let upload = single_upload(&state.defaults, multipart).await?;
    let (page, statistics) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let page = metadata::read_page_metadata(&upload.path)?;
        let statistics = stats::statistics_for_file(&upload.path, &upload.options)?;
        Ok((page, statistics))
    })
    .await
    .map_err(internal_error)?
    .map_err(|e| unprocessable(format!("{:#}", e)))?;

    Ok(Json(json!({
        "caption": page.caption(),
        "metadata": page,
        "statistics": statistics
    })))
}

/// Archive detection sniffs magic bytes, but keep a known extension as a fallback hint.
fn upload_extension(original_name: Option<&str>) -> &'static str {
    let ext = original_name
        .and_then(|n| std::path::Path::new(n).extension())
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("rar") => "rar",
        Some("iso") => "iso",
        _ => "zip",
    }
}

fn pipeline_status(err: PipelineError) -> (StatusCode, String) {
    match err {
        PipelineError::InvalidConfig(_)
        | PipelineError::Normalize(_)
        | PipelineError::Archive(_)
        | PipelineError::NoImages { .. } => unprocessable(err),
        _ => internal_error(err),
    }
}

fn bad_request<E: Display>(err: E) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn internal_error<E: Display>(err: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn unprocessable<E: Display>(err: E) -> (StatusCode, String) {
    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
}

fn not_found<E: Display>(err: E) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, err.to_string())
}
