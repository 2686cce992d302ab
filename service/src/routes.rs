use axum::{
    Router,
    routing::{get, post},
    response::{IntoResponse, Response},
    http::{StatusCode, header},
    extract::{Path, Query, State, Multipart},
    Json,
};
use crate::arrow_io::{batches_to_csv, batches_to_ipc};
use crate::config::ServiceConfig;
use crate::models::{CreateSessionResponse, ParseResponse, SessionMeta, TableFormat, TableQuery};
use crate::pipeline::process_blobs;
use crate::storage::{SessionStorage, StorageError, ingest_messages};
use hl7_parser::{RawAssembler, RawBlob, SchemaRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, debug, warn, error, instrument};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<SessionStorage>,
    pub registry: Arc<SchemaRegistry>,
    pub chunk_size: usize,
}

impl AppState {
    pub fn new(config: &ServiceConfig) -> std::io::Result<Self> {
        let storage = SessionStorage::new(config.data_dir())?;
        Ok(Self {
            storage: Arc::new(storage),
            registry: Arc::new(SchemaRegistry::new()),
            chunk_size: config.chunk_size(),
        })
    }
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/parse", post(parse_message))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", axum::routing::delete(delete_session))
        .route("/sessions/:id/meta", get(get_meta))
        .route("/sessions/:id/tables/:table", get(get_table))
        .route("/sessions/:id/messages/:row_id", get(get_message))
        .with_state(state)
}

fn storage_error(e: StorageError) -> (StatusCode, String) {
    match e {
        StorageError::SessionNotFound(_) | StorageError::TableNotFound(_) => {
            (StatusCode::NOT_FOUND, e.to_string())
        }
        _ => {
            error!("Storage error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Claim a buffer name for an upload. One message per upload, so a repeated
/// name gets the first free `#n` suffix.
fn unique_file_name(seen: &mut HashSet<String>, name: &str) -> String {
    if seen.insert(name.to_string()) {
        return name.to_string();
    }

    let mut n = 2;
    loop {
        let candidate = format!("{}#{}", name, n);
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// A payload file that does not exist is an unknown row, anything else is a
/// storage failure
fn payload_error(e: StorageError, row_id: u32) -> (StatusCode, String) {
    match e {
        StorageError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, format!("Message not found: {}", row_id))
        }
        other => storage_error(other),
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Parse and project one message without storing it
#[instrument(skip(state, body))]
async fn parse_message(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ParseResponse>, (StatusCode, String)> {
    debug!("Parse request: {} bytes", body.len());

    let registry = Arc::clone(&state.registry);
    let response = tokio::task::spawn_blocking(move || {
        let message = hl7_parser::parse(&RawBlob::new("request", body));
        let projection = registry.project(&message);
        ParseResponse { message, projection }
    })
    .await
    .map_err(|e| {
        error!("Parse worker failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Parse failed: {}", e))
    })?;

    Ok(Json(response))
}

#[instrument(skip(state, multipart))]
async fn create_session(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CreateSessionResponse>, (StatusCode, String)> {
    info!("Received file upload request");

    let mut assembler = RawAssembler::new();
    let mut seen = HashSet::new();

    while let Some(field) = multipart.next_field().await
        .map_err(|e| {
            error!("Multipart error: {}", e);
            (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
        })?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = unique_file_name(&mut seen, field.file_name().unwrap_or("unknown"));
        info!("Receiving file: {}", filename);

        let data = field.bytes().await
            .map_err(|e| {
                error!("Failed to read file data: {}", e);
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?;
        debug!("File data received: {} bytes", data.len());

        assembler.push_text(&filename, &String::from_utf8_lossy(&data));
    }

    let blobs = assembler.drain();
    if blobs.is_empty() {
        error!("No file data provided in request");
        return Err((StatusCode::BAD_REQUEST, "No file provided".to_string()));
    }

    let session_id = state.storage.create_session()
        .map_err(|e| {
            error!("Failed to create session: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to create session: {}", e))
        })?;
    info!("Created session: {}", session_id);

    let processed = process_blobs(Arc::clone(&state.registry), blobs).await;

    let storage = Arc::clone(&state.storage);
    let registry = Arc::clone(&state.registry);
    let chunk_size = state.chunk_size;
    let ingest_session = session_id.clone();
    let meta = tokio::task::spawn_blocking(move || {
        ingest_messages(&storage, &ingest_session, &registry, processed.into_iter(), chunk_size)
    })
    .await
    .map_err(|e| {
        error!("Ingest worker failed for session {}: {}", session_id, e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Ingest failed: {}", e))
    })?
    .map_err(|e| {
        error!("Ingest failed for session {}: {}", session_id, e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Ingest failed: {}", e))
    })?;

    if meta.error_count > 0 {
        warn!("Session {} has {} malformed messages", session_id, meta.error_count);
    }

    info!("Successfully ingested messages for session: {}", session_id);
    Ok(Json(CreateSessionResponse {
        session_id,
        message_count: meta.message_count,
        error_count: meta.error_count,
    }))
}

async fn get_meta(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionMeta>, (StatusCode, String)> {
    let meta = state.storage.read_meta(&session_id).map_err(storage_error)?;
    Ok(Json(meta))
}

#[instrument(skip(state))]
async fn get_table(
    State(state): State<AppState>,
    Path((session_id, table)): Path<(String, String)>,
    Query(query): Query<TableQuery>,
) -> Result<Response, (StatusCode, String)> {
    info!("Fetching table {} for session {}", table, session_id);

    let data = state.storage.read_table(&session_id, &table).map_err(storage_error)?;
    debug!("Table {} has {} rows in {} chunks", table, data.num_rows(), data.batches.len());

    let (content_type, body) = match query.format {
        TableFormat::Arrow => {
            let buffer = batches_to_ipc(&data.schema, &data.batches)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to write Arrow: {}", e)))?;
            ("application/vnd.apache.arrow.stream", buffer)
        }
        TableFormat::Csv => {
            let buffer = batches_to_csv(&data.schema, &data.batches)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to write CSV: {}", e)))?;
            ("text/csv", buffer)
        }
    };

    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

async fn get_message(
    State(state): State<AppState>,
    Path((session_id, row_id)): Path<(String, u32)>,
) -> Result<Json<hl7_parser::ParsedMessage>, (StatusCode, String)> {
    let message = state.storage.read_payload(&session_id, row_id)
        .map_err(|e| payload_error(e, row_id))?;

    Ok(Json(message))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.storage.delete_session(&session_id).map_err(storage_error)?;
    Ok(StatusCode::NO_CONTENT)
}
