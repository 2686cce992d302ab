use hl7_parser::{parse, MessageProjection, ParsedMessage, RawBlob, SchemaRegistry};
use std::sync::Arc;
use tracing::{debug, error, info};

/// One source file carried through parse and projection, ready for storage
#[derive(Debug, Clone)]
pub struct ProcessedMessage {
    pub row_id: u32,
    pub raw: RawBlob,
    pub message: ParsedMessage,
    pub projection: MessageProjection,
}

impl ProcessedMessage {
    pub fn is_error(&self) -> bool {
        self.message.is_error()
    }
}

pub fn process_blob(registry: &SchemaRegistry, row_id: u32, raw: RawBlob) -> ProcessedMessage {
    let message = parse(&raw);
    let projection = registry.project(&message);
    ProcessedMessage {
        row_id,
        raw,
        message,
        projection,
    }
}

/// A blob whose worker died, recorded as an ERROR message like any other bad input
fn failed_blob(
    registry: &SchemaRegistry,
    row_id: u32,
    file_identifier: String,
    description: String,
) -> ProcessedMessage {
    let message = ParsedMessage::error(description);
    let projection = registry.project(&message);
    ProcessedMessage {
        row_id,
        raw: RawBlob::new(file_identifier, String::new()),
        message,
        projection,
    }
}

/// Parse and project every blob on the blocking pool, one task per blob.
/// Results come back in input order.
pub async fn process_blobs(
    registry: Arc<SchemaRegistry>,
    blobs: Vec<RawBlob>,
) -> Vec<ProcessedMessage> {
    info!("Processing {} messages", blobs.len());

    let handles: Vec<_> = blobs
        .into_iter()
        .enumerate()
        .map(|(idx, blob)| {
            let registry = Arc::clone(&registry);
            let file_identifier = blob.file_identifier.clone();
            let handle =
                tokio::task::spawn_blocking(move || process_blob(&registry, idx as u32, blob));
            (idx as u32, file_identifier, handle)
        })
        .collect();

    let mut processed = Vec::with_capacity(handles.len());
    for (row_id, file_identifier, handle) in handles {
        match handle.await {
            Ok(msg) => processed.push(msg),
            Err(e) => {
                error!("Worker for '{}' failed: {}", file_identifier, e);
                processed.push(failed_blob(
                    &registry,
                    row_id,
                    file_identifier,
                    format!("worker failed: {}", e),
                ));
            }
        }
    }

    debug!(
        "Processed {} messages, {} failed to parse",
        processed.len(),
        processed.iter().filter(|m| m.is_error()).count()
    );
    processed
}
