use crate::models::SessionMeta;
use crate::pipeline::ProcessedMessage;
use arrow::array::{
    Array, ArrayRef, MapArray, MapBuilder, StringArray, StringBuilder, StructArray, UInt32Array,
};
use arrow::datatypes::Schema;
use arrow::error::ArrowError;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use hl7_parser::{GenericRecord, ProjectedRecord, RawBlob, SegmentSchema};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub const RAW_TABLE: &str = "raw_data";
pub const MESSAGES_TABLE: &str = "messages";
pub const ALL_SEGMENTS_TABLE: &str = "gold_all";

/// Column-wise row buffer for one output table
pub trait TableBuilder {
    fn table_name(&self) -> &str;
    fn len(&self) -> usize;
    fn clear(&mut self);
    fn build_batch(&self) -> Result<RecordBatch, ArrowError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn utf8(values: &[String]) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(values.iter()))
}

fn nullable_utf8(values: &[Option<String>]) -> ArrayRef {
    Arc::new(values.iter().map(|v| v.as_deref()).collect::<StringArray>())
}

/// `raw_data`: file_identifier, text
#[derive(Default)]
pub struct RawBuilder {
    file_identifier: Vec<String>,
    text: Vec<String>,
}

impl RawBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: &RawBlob) {
        self.file_identifier.push(raw.file_identifier.clone());
        self.text.push(raw.text.clone());
    }
}

impl TableBuilder for RawBuilder {
    fn table_name(&self) -> &str {
        RAW_TABLE
    }

    fn len(&self) -> usize {
        self.file_identifier.len()
    }

    fn clear(&mut self) {
        self.file_identifier.clear();
        self.text.clear();
    }

    fn build_batch(&self) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_from_iter_with_nullable(vec![
            ("file_identifier", utf8(&self.file_identifier), false),
            ("text", utf8(&self.text), false),
        ])
    }
}

/// `messages`: one row per parsed message, header fields and parse outcome
#[derive(Default)]
pub struct MessageBuilder {
    row_id: Vec<u32>,
    file_identifier: Vec<String>,
    message_type: Vec<Option<String>>,
    message_datetime: Vec<Option<String>>,
    patient_id: Vec<Option<String>>,
    patient_name: Vec<Option<String>>,
    segment_count: Vec<u32>,
    parse_error: Vec<Option<String>>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: &ProcessedMessage) {
        let parsed = &msg.message;
        self.row_id.push(msg.row_id);
        self.file_identifier.push(msg.raw.file_identifier.clone());
        self.message_type.push(parsed.message_type.clone());
        self.message_datetime.push(parsed.message_datetime.clone());
        self.patient_id.push(parsed.patient_id.clone());
        self.patient_name.push(parsed.patient_name.clone());
        self.segment_count.push(parsed.segments.len() as u32);
        self.parse_error
            .push(parsed.error_description().map(str::to_string));
    }
}

impl TableBuilder for MessageBuilder {
    fn table_name(&self) -> &str {
        MESSAGES_TABLE
    }

    fn len(&self) -> usize {
        self.row_id.len()
    }

    fn clear(&mut self) {
        self.row_id.clear();
        self.file_identifier.clear();
        self.message_type.clear();
        self.message_datetime.clear();
        self.patient_id.clear();
        self.patient_name.clear();
        self.segment_count.clear();
        self.parse_error.clear();
    }

    fn build_batch(&self) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_from_iter_with_nullable(vec![
            ("row_id", Arc::new(UInt32Array::from(self.row_id.clone())) as ArrayRef, false),
            ("file_identifier", utf8(&self.file_identifier), false),
            ("message_type", nullable_utf8(&self.message_type), true),
            ("message_datetime", nullable_utf8(&self.message_datetime), true),
            ("patient_id", nullable_utf8(&self.patient_id), true),
            ("patient_name", nullable_utf8(&self.patient_name), true),
            (
                "segment_count",
                Arc::new(UInt32Array::from(self.segment_count.clone())) as ArrayRef,
                false,
            ),
            ("parse_error", nullable_utf8(&self.parse_error), true),
        ])
    }
}

/// `gold_all`: every segment with its whole field map
#[derive(Default)]
pub struct GenericBuilder {
    message_type: Vec<Option<String>>,
    message_datetime: Vec<Option<String>>,
    patient_id: Vec<Option<String>>,
    segment_id: Vec<String>,
    fields: Vec<IndexMap<String, String>>,
}

impl GenericBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: &GenericRecord) {
        self.message_type.push(record.message_type.clone());
        self.message_datetime.push(record.message_datetime.clone());
        self.patient_id.push(record.patient_id.clone());
        self.segment_id.push(record.segment_id.clone());
        self.fields.push(record.fields.clone());
    }

    fn build_fields(&self) -> Result<MapArray, ArrowError> {
        let mut builder = MapBuilder::new(None, StringBuilder::new(), StringBuilder::new());
        for fields in &self.fields {
            for (name, value) in fields {
                builder.keys().append_value(name);
                builder.values().append_value(value);
            }
            builder.append(true)?;
        }
        Ok(builder.finish())
    }
}

impl TableBuilder for GenericBuilder {
    fn table_name(&self) -> &str {
        ALL_SEGMENTS_TABLE
    }

    fn len(&self) -> usize {
        self.segment_id.len()
    }

    fn clear(&mut self) {
        self.message_type.clear();
        self.message_datetime.clear();
        self.patient_id.clear();
        self.segment_id.clear();
        self.fields.clear();
    }

    fn build_batch(&self) -> Result<RecordBatch, ArrowError> {
        let fields: ArrayRef = Arc::new(self.build_fields()?);
        RecordBatch::try_from_iter_with_nullable(vec![
            ("message_type", nullable_utf8(&self.message_type), true),
            ("message_datetime", nullable_utf8(&self.message_datetime), true),
            ("patient_id", nullable_utf8(&self.patient_id), true),
            ("segment_id", utf8(&self.segment_id), false),
            ("fields", fields, false),
        ])
    }
}

/// `gold_<type>`: the fixed column list of one segment schema
pub struct TypedBuilder {
    table_name: String,
    column_names: Vec<String>,
    message_type: Vec<Option<String>>,
    message_datetime: Vec<Option<String>>,
    patient_id: Vec<Option<String>>,
    segment_id: Vec<String>,
    columns: Vec<Vec<Option<String>>>,
}

impl TypedBuilder {
    pub fn new(schema: &SegmentSchema) -> Self {
        Self {
            table_name: schema.table_name(),
            column_names: schema.columns().to_vec(),
            message_type: Vec::new(),
            message_datetime: Vec::new(),
            patient_id: Vec::new(),
            segment_id: Vec::new(),
            columns: vec![Vec::new(); schema.columns().len()],
        }
    }

    pub fn push(&mut self, record: &ProjectedRecord) {
        self.message_type.push(record.message_type.clone());
        self.message_datetime.push(record.message_datetime.clone());
        self.patient_id.push(record.patient_id.clone());
        self.segment_id.push(record.segment_id.clone());
        for (name, column) in self.column_names.iter().zip(self.columns.iter_mut()) {
            column.push(record.get(name).map(str::to_string));
        }
    }
}

impl TableBuilder for TypedBuilder {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn len(&self) -> usize {
        self.segment_id.len()
    }

    fn clear(&mut self) {
        self.message_type.clear();
        self.message_datetime.clear();
        self.patient_id.clear();
        self.segment_id.clear();
        for column in &mut self.columns {
            column.clear();
        }
    }

    fn build_batch(&self) -> Result<RecordBatch, ArrowError> {
        let mut columns: Vec<(&str, ArrayRef, bool)> = vec![
            ("message_type", nullable_utf8(&self.message_type), true),
            ("message_datetime", nullable_utf8(&self.message_datetime), true),
            ("patient_id", nullable_utf8(&self.patient_id), true),
            ("segment_id", utf8(&self.segment_id), false),
        ];
        for (name, values) in self.column_names.iter().zip(&self.columns) {
            columns.push((name.as_str(), nullable_utf8(values), true));
        }
        RecordBatch::try_from_iter_with_nullable(columns)
    }
}

pub fn write_arrow_chunk(batch: &RecordBatch, path: &Path) -> Result<(), ArrowError> {
    let file = File::create(path)?;
    let mut writer = StreamWriter::try_new(file, &batch.schema())?;
    writer.write(batch)?;
    writer.finish()?;
    Ok(())
}

/// Serialize batches into one Arrow IPC stream
pub fn batches_to_ipc(schema: &Schema, batches: &[RecordBatch]) -> Result<Vec<u8>, ArrowError> {
    let mut buffer = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buffer, schema)?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.finish()?;
    }
    Ok(buffer)
}

/// Render batches as CSV. Map columns become JSON objects, nulls empty cells.
pub fn batches_to_csv(
    schema: &Schema,
    batches: &[RecordBatch],
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let header: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    writer.write_record(&header)?;

    for batch in batches {
        for row in 0..batch.num_rows() {
            let record = batch
                .columns()
                .iter()
                .map(|column| cell_to_string(column.as_ref(), row))
                .collect::<Result<Vec<_>, _>>()?;
            writer.write_record(&record)?;
        }
    }

    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

fn cell_to_string(column: &dyn Array, row: usize) -> Result<String, ArrowError> {
    if column.is_null(row) {
        return Ok(String::new());
    }

    if let Some(values) = column.as_any().downcast_ref::<StringArray>() {
        return Ok(values.value(row).to_string());
    }
    if let Some(values) = column.as_any().downcast_ref::<UInt32Array>() {
        return Ok(values.value(row).to_string());
    }
    if let Some(map) = column.as_any().downcast_ref::<MapArray>() {
        return Ok(map_entries_to_json(&map.value(row)));
    }

    Err(ArrowError::InvalidArgumentError(format!(
        "unsupported column type {}",
        column.data_type()
    )))
}

fn map_entries_to_json(entries: &StructArray) -> String {
    let keys = entries.column(0).as_any().downcast_ref::<StringArray>();
    let values = entries.column(1).as_any().downcast_ref::<StringArray>();

    let mut object = serde_json::Map::new();
    if let (Some(keys), Some(values)) = (keys, values) {
        for i in 0..keys.len() {
            let value = if values.is_null(i) {
                serde_json::Value::Null
            } else {
                serde_json::Value::String(values.value(i).to_string())
            };
            object.insert(keys.value(i).to_string(), value);
        }
    }
    serde_json::Value::Object(object).to_string()
}

/// Accumulates the ingest summary while messages stream through
pub struct MetaCollector {
    pub message_count: usize,
    pub error_count: usize,
    pub segment_count: usize,
    pub message_types: BTreeSet<String>,
}

impl MetaCollector {
    pub fn new() -> Self {
        Self {
            message_count: 0,
            error_count: 0,
            segment_count: 0,
            message_types: BTreeSet::new(),
        }
    }

    pub fn update(&mut self, msg: &ProcessedMessage) {
        self.message_count += 1;
        if msg.is_error() {
            self.error_count += 1;
            return;
        }
        self.segment_count += msg.message.segments.len();
        if let Some(message_type) = &msg.message.message_type {
            self.message_types.insert(message_type.clone());
        }
    }

    pub fn into_meta(self, table_rows: IndexMap<String, usize>) -> SessionMeta {
        SessionMeta {
            created_at: Utc::now(),
            message_count: self.message_count,
            error_count: self.error_count,
            segment_count: self.segment_count,
            table_rows,
            message_types: self.message_types.into_iter().collect(),
        }
    }
}

impl Default for MetaCollector {
    fn default() -> Self {
        Self::new()
    }
}
