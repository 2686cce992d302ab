use crate::arrow_io::{
    write_arrow_chunk, GenericBuilder, MessageBuilder, MetaCollector, RawBuilder, TableBuilder,
    TypedBuilder,
};
use crate::models::SessionMeta;
use crate::pipeline::ProcessedMessage;
use arrow::datatypes::SchemaRef;
use arrow::ipc::reader::StreamReader;
use arrow::record_batch::RecordBatch;
use hl7_parser::{ParsedMessage, SchemaRegistry};
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("MessagePack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),
    #[error("MessagePack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Table not found: {0}")]
    TableNotFound(String),
}

/// Schema and batches of one stored table
pub struct TableData {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl TableData {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

pub struct SessionStorage {
    base_path: PathBuf,
}

impl SessionStorage {
    pub fn new(base_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn create_session(&self) -> std::io::Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let session_path = self.base_path.join(&session_id);

        fs::create_dir_all(session_path.join("tables"))?;
        fs::create_dir_all(session_path.join("payloads"))?;

        Ok(session_id)
    }

    /// Path of an existing session. Ids that are not UUIDs never reach the
    /// filesystem.
    pub fn session_path(&self, session_id: &str) -> Result<PathBuf, StorageError> {
        if Uuid::parse_str(session_id).is_err() {
            return Err(StorageError::SessionNotFound(session_id.to_string()));
        }
        let path = self.base_path.join(session_id);
        if !path.is_dir() {
            return Err(StorageError::SessionNotFound(session_id.to_string()));
        }
        Ok(path)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<(), StorageError> {
        match self.session_path(session_id) {
            Ok(path) => fs::remove_dir_all(path)?,
            Err(StorageError::SessionNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    pub fn write_meta(&self, session_id: &str, meta: &SessionMeta) -> Result<(), StorageError> {
        let meta_path = self.session_path(session_id)?.join("meta.json");
        let json = serde_json::to_string_pretty(meta)?;
        fs::write(meta_path, json)?;
        Ok(())
    }

    pub fn read_meta(&self, session_id: &str) -> Result<SessionMeta, StorageError> {
        let meta_path = self.session_path(session_id)?.join("meta.json");
        let json = fs::read_to_string(meta_path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn write_payload(
        &self,
        session_id: &str,
        row_id: u32,
        message: &ParsedMessage,
    ) -> Result<(), StorageError> {
        let payload_path = self.payload_path(session_id, row_id)?;
        let msgpack = rmp_serde::to_vec_named(message)?;
        fs::write(payload_path, msgpack)?;
        Ok(())
    }

    pub fn read_payload(&self, session_id: &str, row_id: u32) -> Result<ParsedMessage, StorageError> {
        let payload_path = self.payload_path(session_id, row_id)?;
        let msgpack = fs::read(payload_path)?;
        Ok(rmp_serde::from_slice(&msgpack)?)
    }

    fn payload_path(&self, session_id: &str, row_id: u32) -> Result<PathBuf, StorageError> {
        Ok(self
            .session_path(session_id)?
            .join("payloads")
            .join(format!("{}.mp", row_id)))
    }

    pub fn chunk_path(
        &self,
        session_id: &str,
        table: &str,
        chunk_idx: usize,
    ) -> Result<PathBuf, StorageError> {
        let table_dir = self.session_path(session_id)?.join("tables").join(table);
        fs::create_dir_all(&table_dir)?;
        Ok(table_dir.join(format!("{:03}.arrow", chunk_idx)))
    }

    /// Names of the tables written for a session
    pub fn list_tables(&self, session_id: &str) -> Result<Vec<String>, StorageError> {
        let tables_dir = self.session_path(session_id)?.join("tables");
        let mut tables = Vec::new();

        for entry in fs::read_dir(tables_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                tables.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        tables.sort();
        Ok(tables)
    }

    pub fn list_chunks(&self, session_id: &str, table: &str) -> Result<Vec<PathBuf>, StorageError> {
        if !self.list_tables(session_id)?.iter().any(|t| t == table) {
            return Err(StorageError::TableNotFound(table.to_string()));
        }

        let table_dir = self.session_path(session_id)?.join("tables").join(table);
        let mut chunks = Vec::new();

        for entry in fs::read_dir(table_dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|s| s.to_str()) == Some("arrow") {
                chunks.push(entry.path());
            }
        }

        chunks.sort();
        Ok(chunks)
    }

    /// Read every chunk of a table, in chunk order
    pub fn read_table(&self, session_id: &str, table: &str) -> Result<TableData, StorageError> {
        let mut schema = None;
        let mut batches = Vec::new();

        for chunk_path in self.list_chunks(session_id, table)? {
            let file = fs::File::open(chunk_path)?;
            let reader = StreamReader::try_new(file, None)?;
            schema.get_or_insert_with(|| reader.schema());
            for batch in reader {
                batches.push(batch?);
            }
        }

        let schema = schema.ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        debug!("Read {} batches from table {}", batches.len(), table);
        Ok(TableData { schema, batches })
    }
}

/// Row buffer plus the chunk files already written for one table
struct ChunkedTable<B: TableBuilder> {
    builder: B,
    chunk_idx: usize,
    rows: usize,
}

impl<B: TableBuilder> ChunkedTable<B> {
    fn new(builder: B) -> Self {
        Self {
            builder,
            chunk_idx: 0,
            rows: 0,
        }
    }

    fn flush(&mut self, storage: &SessionStorage, session_id: &str) -> Result<(), StorageError> {
        let batch = self.builder.build_batch()?;
        let chunk_path = storage.chunk_path(session_id, self.builder.table_name(), self.chunk_idx)?;
        write_arrow_chunk(&batch, &chunk_path)?;

        self.rows += batch.num_rows();
        self.builder.clear();
        self.chunk_idx += 1;
        Ok(())
    }

    fn flush_if_full(
        &mut self,
        storage: &SessionStorage,
        session_id: &str,
        chunk_size: usize,
    ) -> Result<(), StorageError> {
        if self.builder.len() >= chunk_size {
            self.flush(storage, session_id)?;
        }
        Ok(())
    }

    /// Write remaining rows. A table that never received a row still gets one
    /// empty chunk so its schema can be served.
    fn finish(
        mut self,
        storage: &SessionStorage,
        session_id: &str,
    ) -> Result<(String, usize), StorageError> {
        if !self.builder.is_empty() || self.chunk_idx == 0 {
            self.flush(storage, session_id)?;
        }
        Ok((self.builder.table_name().to_string(), self.rows))
    }
}

/// Process messages and write every output table to storage
pub fn ingest_messages(
    storage: &SessionStorage,
    session_id: &str,
    registry: &SchemaRegistry,
    messages: impl Iterator<Item = ProcessedMessage>,
    chunk_size: usize,
) -> Result<SessionMeta, StorageError> {
    let mut raw = ChunkedTable::new(RawBuilder::new());
    let mut parsed = ChunkedTable::new(MessageBuilder::new());
    let mut all = ChunkedTable::new(GenericBuilder::new());
    let mut typed: Vec<(String, ChunkedTable<TypedBuilder>)> = registry
        .schemas()
        .iter()
        .map(|schema| {
            (
                schema.segment_id().to_string(),
                ChunkedTable::new(TypedBuilder::new(schema)),
            )
        })
        .collect();
    let mut meta_collector = MetaCollector::new();

    for msg in messages {
        meta_collector.update(&msg);
        storage.write_payload(session_id, msg.row_id, &msg.message)?;

        raw.builder.push(&msg.raw);
        raw.flush_if_full(storage, session_id, chunk_size)?;

        parsed.builder.push(&msg);
        parsed.flush_if_full(storage, session_id, chunk_size)?;

        for record in &msg.projection.all {
            all.builder.push(record);
            all.flush_if_full(storage, session_id, chunk_size)?;
        }

        for (segment_id, table) in typed.iter_mut() {
            let Some(records) = msg.projection.typed.get(segment_id.as_str()) else {
                continue;
            };
            for record in records {
                table.builder.push(record);
                table.flush_if_full(storage, session_id, chunk_size)?;
            }
        }
    }

    let mut table_rows = IndexMap::new();
    for (name, rows) in [
        raw.finish(storage, session_id)?,
        parsed.finish(storage, session_id)?,
        all.finish(storage, session_id)?,
    ] {
        table_rows.insert(name, rows);
    }
    for (_, table) in typed {
        let (name, rows) = table.finish(storage, session_id)?;
        table_rows.insert(name, rows);
    }

    let meta = meta_collector.into_meta(table_rows);
    storage.write_meta(session_id, &meta)?;

    info!(
        "Ingested {} messages ({} errors) into session {}",
        meta.message_count, meta.error_count, session_id
    );
    Ok(meta)
}
