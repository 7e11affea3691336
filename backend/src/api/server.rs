//! HTTP server for the sheetload API.
//!
//! # API Endpoints
//!
//! | Method | Path                     | Description                              |
//! |--------|--------------------------|------------------------------------------|
//! | GET    | `/health`                | Health check                             |
//! | POST   | `/api/import`            | Upload a spreadsheet and an import config |
//! | GET    | `/api/records/{model}`   | Stored records of a model                |
//! | GET    | `/api/notifications`     | SSE stream of import notifications       |
//! | GET    | `/api/logs`              | SSE stream of pipeline logs              |

use axum::{
    extract::{Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, ImportMetadata, ImportResponse, RecordsResponse};
use crate::config::{ImportConfig, Settings};
use crate::error::{ImportError, ServerError, ServerResult};
use crate::notify::{CollectingSink, FanoutSink, NotificationSink, NOTIFICATIONS};
use crate::storage::{Disks, LOCAL_DISK};
use crate::store::{ModelStore, RecordStore};

type ApiError = (StatusCode, Json<Value>);

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<RecordStore>>,
    pub disks: Disks,
}

impl AppState {
    pub fn new(store: RecordStore, disks: Disks) -> Self {
        Self { store: Arc::new(Mutex::new(store)), disks }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/import", post(import_upload))
        .route("/api/records/{model}", get(list_records))
        .route("/api/notifications", get(sse_notifications))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = settings.open_store()?;
    let state = AppState::new(store, settings.disks());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    println!("🚀 Sheetload server running on http://localhost:{}", settings.port);
    println!("   POST /api/import          - Import a spreadsheet");
    println!("   GET  /api/records/:model  - List stored records");
    println!("   GET  /api/notifications   - SSE notification stream");
    println!("   GET  /api/logs            - SSE log stream");
    println!("   GET  /health              - Health check");
    println!();
    println!("📁 Store: {}", settings.store_dir.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sheetload",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "import": "POST /api/import",
            "records": "GET /api/records/{model}",
            "notifications": "GET /api/notifications (SSE)",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// Serialize every broadcast item as an SSE event
fn sse_stream<T>(
    rx: tokio::sync::broadcast::Receiver<T>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + Clone + Send + 'static,
{
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(item) => {
            let json = serde_json::to_string(&item).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    sse_stream(LOG_BROADCASTER.subscribe())
}

async fn sse_notifications() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    sse_stream(NOTIFICATIONS.subscribe())
}

async fn list_records(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let store = state.store.lock().map_err(|_| api_error(ServerError::Internal("Store lock poisoned".into())))?;
    let records = store.all(&model);
    Ok(Json(RecordsResponse { model, count: records.len(), records }))
}

/// Import endpoint: multipart `file` + `config` (JSON import definition)
async fn import_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportResponse>, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut config_json: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(ServerError::BadRequest(format!("Multipart error: {}", e))))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| api_error(ServerError::BadRequest(format!("Read error: {}", e))))?;
                file_data = Some(bytes.to_vec());
            }
            "config" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| api_error(ServerError::BadRequest(format!("Read error: {}", e))))?;
                config_json = Some(text);
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| api_error(ServerError::BadRequest("No file provided".into())))?;
    let config_json = config_json.ok_or_else(|| api_error(ServerError::BadRequest("No config provided".into())))?;

    let config = ImportConfig::from_json(&config_json).map_err(|e| api_error(ImportError::from(e).into()))?;
    let metadata = ImportMetadata { file_name: file_name.clone(), model: config.model.clone(), bytes: bytes.len() };

    println!("\n{}", "=".repeat(70));
    println!(
        "📄 NEW IMPORT: {} ({} bytes) -> {}",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len(),
        metadata.model
    );
    println!("{}\n", "=".repeat(70));

    let response = tokio::task::spawn_blocking(move || run_import(state, config, file_name, bytes, metadata))
        .await
        .map_err(|e| api_error(ServerError::Internal(format!("Import task failed: {}", e))))?
        .map_err(|e| {
            log_error(format!("Import error: {}", e));
            api_error(e)
        })?;

    Ok(Json(response))
}

/// Store the upload on the local disk, import it, then delete it.
fn run_import(
    state: AppState,
    config: ImportConfig,
    file_name: Option<String>,
    bytes: Vec<u8>,
    metadata: ImportMetadata,
) -> ServerResult<ImportResponse> {
    let extension = file_name
        .as_deref()
        .and_then(|n| std::path::Path::new(n).extension())
        .and_then(|e| e.to_str())
        .unwrap_or("csv")
        .to_lowercase();
    let relative = format!("uploads/{}.{}", uuid::Uuid::new_v4(), extension);

    state.disks.put(LOCAL_DISK, &relative, &bytes).map_err(ImportError::from)?;
    log_info(format!("Stored upload as {}", relative));

    let import = config
        .into_import()
        .map_err(ImportError::from)?
        .storage(state.disks.clone())
        .disk(LOCAL_DISK)
        .spreadsheet(relative.clone());

    let collected = CollectingSink::new();
    let sink = FanoutSink::new(vec![&collected as &dyn NotificationSink, &*NOTIFICATIONS]);

    let outcome = {
        let mut store = state
            .store
            .lock()
            .map_err(|_| ServerError::Internal("Store lock poisoned".into()))?;
        import.execute(&mut *store, &sink)
    };

    if let Err(e) = state.disks.delete(LOCAL_DISK, &relative) {
        log_error(format!("Could not delete upload {}: {}", relative, e));
    }

    Ok(ImportResponse::new(outcome?, collected.notifications(), metadata))
}

fn api_error(error: ServerError) -> ApiError {
    let status = match &error {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::Import(ImportError::Config(_) | ImportError::Sheet(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        ServerError::Import(ImportError::MissingModel | ImportError::MissingSpreadsheet) => StatusCode::BAD_REQUEST,
        ServerError::Import(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error_response(&error.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ImportOutcome;
    use tempfile::tempdir;

    fn config() -> ImportConfig {
        ImportConfig::from_value(json!({
            "model": "users",
            "skipHeader": true,
            "fields": { "email": 0, "name": 1 },
            "descriptors": { "email": { "required": true, "rules": "email" } },
            "uniqueField": "email"
        }))
        .unwrap()
    }

    #[test]
    fn test_run_import_stores_records_and_cleans_up() {
        let dir = tempdir().unwrap();
        let state = AppState::new(RecordStore::in_memory(), Disks::new(dir.path()));
        let bytes = b"email;name\nada@example.com;Ada\n".to_vec();
        let metadata = ImportMetadata { file_name: Some("users.csv".into()), model: "users".into(), bytes: bytes.len() };

        let response = run_import(state.clone(), config(), Some("users.csv".into()), bytes, metadata).unwrap();

        assert_eq!(response.status, "completed");
        assert!(matches!(response.outcome, ImportOutcome::Completed(_)));
        assert_eq!(response.notifications.len(), 1);
        assert_eq!(state.store.lock().unwrap().all("users").len(), 1);

        let uploads = dir.path().join("uploads");
        assert_eq!(std::fs::read_dir(uploads).unwrap().count(), 0);
    }

    #[test]
    fn test_run_import_reports_rejection() {
        let dir = tempdir().unwrap();
        let state = AppState::new(RecordStore::in_memory(), Disks::new(dir.path()));
        let bytes = b"email;name\nnot-an-email;Ada\n".to_vec();
        let metadata = ImportMetadata { file_name: None, model: "users".into(), bytes: bytes.len() };

        let response = run_import(state.clone(), config(), None, bytes, metadata).unwrap();

        assert_eq!(response.status, "rejected");
        assert!(response.notifications[0].body.contains("line 2"));
        assert!(state.store.lock().unwrap().all("users").is_empty());
    }

    #[test]
    fn test_api_error_status() {
        let (status, _) = api_error(ServerError::BadRequest("x".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = api_error(ServerError::Import(ImportError::MissingModel));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
