//! Upload/download server
//!
//! `POST` takes a multipart upload (`file`, `format`), keeps it for a short
//! while and optionally pre-renders a workbook. `GET ?file=&format=` returns
//! the workbook or the JSON export of a kept upload.

mod error;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use apkg_core::{ApkgReader, ApkgResult, ExportOptions, ExportResult, ServerConfig};

use crate::xlsx;

use error::ApiError;
use registry::{sanitize_filename, UploadRegistry};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<UploadRegistry>,
    pub export: ExportOptions,
}

/// Build the router; every path accepts uploads and downloads
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(download).post(upload))
        .route("/*path", get(download).post(upload))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the server until Ctrl-C, then remove every remaining upload
pub async fn run(config: &ServerConfig, export: ExportOptions) -> Result<()> {
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload directory {:?}", config.upload_dir))?;

    let registry = Arc::new(UploadRegistry::new(
        &config.upload_dir,
        Duration::from_secs(config.upload_ttl_secs),
    ));
    let sweeper = spawn_sweeper(
        registry.clone(),
        Duration::from_secs(config.sweep_interval_secs.max(1)),
    );

    let app = router(
        AppState {
            registry: registry.clone(),
            export,
        },
        config.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!(
        "Listening on {} (uploads in {:?}, kept {}s)",
        listener.local_addr()?,
        config.upload_dir,
        config.upload_ttl_secs
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    registry.clear();
    info!("Server stopped, uploads removed");

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

fn spawn_sweeper(registry: Arc<UploadRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let swept = registry.sweep();
            if !swept.is_empty() {
                info!(
                    "Removed {} expired upload(s), {} remaining",
                    swept.len(),
                    registry.len()
                );
            }
        }
    })
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut format: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::BadRequest("Upload has no filename".into()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
                file = Some((filename, data.to_vec()));
            }
            "format" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read format: {}", e)))?;
                format = Some(value);
            }
            _ => {}
        }
    }

    let (filename, data) =
        file.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".into()))?;
    let name = sanitize_filename(&filename)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid filename '{}'", filename)))?;

    let path = state.registry.upload_path(&name);
    tokio::fs::write(&path, &data)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save upload {:?}: {}", path, e)))?;
    state.registry.insert(&name, path.clone());
    info!("Received upload '{}' ({} bytes)", name, data.len());

    let result = export_archive(path, state.export.clone()).await?;

    if format.as_deref().map(str::trim) == Some("xlsx") {
        render(&state, &name, result).await?;
    }

    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
struct DownloadParams {
    file: Option<String>,
    format: Option<String>,
}

async fn download(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let name = params
        .file
        .as_deref()
        .and_then(sanitize_filename)
        .ok_or_else(|| ApiError::NotFound("No file requested".into()))?;
    let upload = state
        .registry
        .get(&name)
        .ok_or_else(|| ApiError::NotFound(format!("No such upload: {}", name)))?;

    if params.format.as_deref() != Some("xlsx") {
        let result = export_archive(upload.path, state.export.clone()).await?;
        return Ok(Json(result).into_response());
    }

    let rendered = match upload.rendered.filter(|p| p.exists()) {
        Some(path) => path,
        None => {
            let result = export_archive(upload.path, state.export.clone()).await?;
            render(&state, &name, result).await?
        }
    };

    let bytes = tokio::fs::read(&rendered)
        .await
        .map_err(|_| ApiError::NotFound(format!("No such upload: {}", name)))?;
    let disposition = format!(
        "attachment; filename=\"{}.xlsx\"",
        name.replace(['"', '\\'], "_")
    );

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Open an archive and export it off the async runtime
async fn export_archive(path: PathBuf, options: ExportOptions) -> Result<ExportResult, ApiError> {
    let result = tokio::task::spawn_blocking(move || -> ApkgResult<ExportResult> {
        let reader = ApkgReader::open(&path)?;
        let result = reader.export(&options)?;
        reader.close()?;
        Ok(result)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Export task failed: {}", e)))??;

    Ok(result)
}

/// Write the workbook for an upload and record it
async fn render(state: &AppState, name: &str, result: ExportResult) -> Result<PathBuf, ApiError> {
    let target = state.registry.rendered_path(name);
    let dest = target.clone();
    tokio::task::spawn_blocking(move || xlsx::write_workbook(&result, &dest))
        .await
        .map_err(|e| ApiError::Internal(format!("Render task failed: {}", e)))??;

    if !state.registry.set_rendered(name, target.clone()) {
        debug!("Upload '{}' expired while rendering", name);
        registry::remove_file(&target);
        return Err(ApiError::NotFound(format!("No such upload: {}", name)));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rusqlite::Connection;
    use std::io::Write;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use zip::write::SimpleFileOptions;

    const BOUNDARY: &str = "apkg-test-boundary";

    /// A one-note deck: model 10 "Basic" (Front/Back), one card in "Default"
    fn deck_bytes(dir: &std::path::Path) -> Vec<u8> {
        let db_path = dir.join("collection.anki21");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE col (models TEXT, decks TEXT);
             CREATE TABLE notes (id INTEGER PRIMARY KEY, guid TEXT, mid INTEGER,
                 mod INTEGER, tags TEXT, flds TEXT);
             CREATE TABLE cards (id INTEGER PRIMARY KEY, nid INTEGER, did INTEGER,
                 ord INTEGER, mod INTEGER, type INTEGER, queue INTEGER, due INTEGER,
                 ivl INTEGER, reps INTEGER, lapses INTEGER);",
        )
        .unwrap();
        let models = serde_json::json!({
            "10": {"name": "Basic", "flds": [{"name": "Front", "ord": 0}, {"name": "Back", "ord": 1}]}
        });
        let decks = serde_json::json!({"1": {"name": "Default"}});
        conn.execute(
            "INSERT INTO col (models, decks) VALUES (?1, ?2)",
            (models.to_string(), decks.to_string()),
        )
        .unwrap();
        conn.execute(
            "INSERT INTO notes VALUES (100, 'g', 10, 0, ' word ', 'hola\u{1f}hello')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO cards VALUES (1000, 100, 1, 0, 0, 0, 0, 1, 0, 0, 0)",
            [],
        )
        .unwrap();
        drop(conn);

        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            zip.start_file("collection.anki21", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(&std::fs::read(&db_path).unwrap()).unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    fn state(temp: &TempDir) -> AppState {
        let uploads = temp.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        AppState {
            registry: Arc::new(UploadRegistry::new(uploads, Duration::from_secs(30))),
            export: ExportOptions::default(),
        }
    }

    fn multipart_body(filename: &str, data: &[u8], format: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"format\"\r\n\r\n{format}\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_file_is_404() {
        let temp = TempDir::new().unwrap();
        let app = router(state(&temp), 1024 * 1024);

        let response = app
            .clone()
            .oneshot(get_req("/api?file=missing.apkg&format=json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get_req("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_json_download_of_registered_upload() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp);
        let path = state.registry.upload_path("deck.apkg");
        std::fs::write(&path, deck_bytes(temp.path())).unwrap();
        state.registry.insert("deck.apkg", path);

        let app = router(state, 1024 * 1024);
        let response = app
            .oneshot(get_req("/export?file=deck.apkg&format=json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["Basic"],
            serde_json::json!([
                ["Front", "Back", "tags", "deck"],
                ["hola", "hello", " word ", "Default"]
            ])
        );
    }

    #[tokio::test]
    async fn test_upload_with_xlsx_prerenders_workbook() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp);
        let registry = state.registry.clone();
        let app = router(state, 1024 * 1024);

        let body = multipart_body("deck.apkg", &deck_bytes(temp.path()), "xlsx");
        let response = app.clone().oneshot(post("/api", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let upload = registry.get("deck.apkg").unwrap();
        assert!(upload.path.exists());
        let rendered = upload.rendered.unwrap();
        assert!(rendered.exists());

        let response = app
            .oneshot(get_req("/api?file=deck.apkg&format=xlsx"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            XLSX_CONTENT_TYPE
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn test_xlsx_rendered_on_demand() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp);
        let registry = state.registry.clone();
        let app = router(state, 1024 * 1024);

        let body = multipart_body("deck.apkg", &deck_bytes(temp.path()), "json");
        let response = app.clone().oneshot(post("/", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(registry.get("deck.apkg").unwrap().rendered.is_none());

        let response = app
            .oneshot(get_req("/?file=deck.apkg&format=xlsx"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(registry.get("deck.apkg").unwrap().rendered.is_some());
    }

    #[tokio::test]
    async fn test_workbook_for_expired_upload_is_removed() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp);
        let target = state.registry.rendered_path("gone.apkg");

        let err = render(&state, "gone.apkg", ExportResult::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(!target.exists());
        state.registry.clear();
        assert_eq!(state.registry.len(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_upload_is_422() {
        let temp = TempDir::new().unwrap();
        let app = router(state(&temp), 1024 * 1024);

        let body = multipart_body("broken.apkg", b"not a zip archive", "xlsx");
        let response = app.oneshot(post("/api", body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_upload_without_file_is_400() {
        let temp = TempDir::new().unwrap();
        let app = router(state(&temp), 1024 * 1024);

        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"format\"\r\n\r\nxlsx\r\n--{BOUNDARY}--\r\n"
        );
        let response = app.oneshot(post("/api", body.into_bytes())).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
