// HL7v2 parsing and segment projection
// Raw lines -> assembled message -> flat segment list -> generic and typed views

pub mod types;
pub mod assembler;
pub mod encoding;
pub mod extractor;
pub mod message_parser;

// Segment type table and the projections built on it
pub mod schemas;
pub mod projection;
pub mod registry;

// Re-export main types
pub use types::*;
pub use assembler::RawAssembler;
pub use extractor::{extract_header, get_field};
pub use message_parser::{parse, parse_text};
pub use projection::{project_all, project_typed, GenericRecord, MessageProjection, ProjectedRecord};
pub use registry::SchemaRegistry;
pub use schemas::SegmentSchema;
