use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Segment id used for the synthetic segment of a message that failed to parse
pub const ERROR_SEGMENT_ID: &str = "ERROR";

/// Field name carrying the failure description inside the ERROR segment
pub const ERROR_FIELD: &str = "error";

/// Whole-message text reassembled from one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlob {
    pub file_identifier: String,
    pub text: String,
}

impl RawBlob {
    pub fn new(file_identifier: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_identifier: file_identifier.into(),
            text: text.into(),
        }
    }
}

/// One segment of a message. Fields are keyed `<segment_id>_<index>` in source
/// order; absent fields have no entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: String,
    #[serde(default)]
    pub fields: IndexMap<String, String>,
}

impl Segment {
    pub fn new(segment_id: impl Into<String>) -> Self {
        Self {
            segment_id: segment_id.into(),
            fields: IndexMap::new(),
        }
    }

    /// Synthetic segment standing in for a message that could not be parsed
    pub fn error(description: impl Into<String>) -> Self {
        let mut fields = IndexMap::with_capacity(1);
        fields.insert(ERROR_FIELD.to_string(), description.into());
        Self {
            segment_id: ERROR_SEGMENT_ID.to_string(),
            fields,
        }
    }

    pub fn is_error(&self) -> bool {
        self.segment_id == ERROR_SEGMENT_ID
    }
}

/// Header fields pulled from the first MSH and PID segments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub message_type: Option<String>,
    pub message_datetime: Option<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub message_type: Option<String>,
    pub message_datetime: Option<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub segments: Vec<Segment>,
}

impl ParsedMessage {
    pub fn from_parts(header: MessageHeader, segments: Vec<Segment>) -> Self {
        Self {
            message_type: header.message_type,
            message_datetime: header.message_datetime,
            patient_id: header.patient_id,
            patient_name: header.patient_name,
            segments,
        }
    }

    /// The fail-soft form: one ERROR segment and no header fields
    pub fn error(description: impl Into<String>) -> Self {
        Self::from_parts(MessageHeader::default(), vec![Segment::error(description)])
    }

    pub fn is_error(&self) -> bool {
        self.segments.len() == 1 && self.segments[0].is_error()
    }

    /// Description carried by the ERROR segment, if this message failed to parse
    pub fn error_description(&self) -> Option<&str> {
        if !self.is_error() {
            return None;
        }
        self.segments[0].fields.get(ERROR_FIELD).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("message contains no segments")]
    Empty,
    #[error("invalid segment id {0:?}")]
    InvalidSegmentId(String),
    #[error("invalid MSH header: {0}")]
    InvalidHeader(String),
}
