use chrono::{DateTime, Utc};
use hl7_parser::{MessageProjection, ParsedMessage};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ingest summary written alongside a session's tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
    pub error_count: usize,
    pub segment_count: usize,
    /// Row count per output table, in write order
    pub table_rows: IndexMap<String, usize>,
    pub message_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub message_count: usize,
    pub error_count: usize,
}

/// Result of parsing a single message without storing it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResponse {
    pub message: ParsedMessage,
    #[serde(flatten)]
    pub projection: MessageProjection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    #[default]
    Arrow,
    Csv,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableQuery {
    #[serde(default)]
    pub format: TableFormat,
}
