use crate::RawBlob;
use std::collections::HashMap;
use tracing::debug;

/// Separator placed between the lines of a reassembled message
pub const SEGMENT_TERMINATOR: &str = "\r";

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Buffers raw lines per source file and joins them back into whole messages.
///
/// Lines for one file must arrive in file order; the assembler keeps arrival
/// order within a file and has no way to detect a shuffled upstream.
#[derive(Debug, Default)]
pub struct RawAssembler {
    buffers: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl RawAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file_identifier: &str, line: impl Into<String>) {
        let line = line.into();
        match self.buffers.get_mut(file_identifier) {
            Some(lines) => lines.push(line),
            None => {
                debug!("Buffering new file: {}", file_identifier);
                // exported files often open with a BOM ahead of MSH
                let line = if line.starts_with(BYTE_ORDER_MARK) {
                    line[BYTE_ORDER_MARK.len_utf8()..].to_string()
                } else {
                    line
                };
                self.order.push(file_identifier.to_string());
                self.buffers.insert(file_identifier.to_string(), vec![line]);
            }
        }
    }

    /// Push every line of a text body. `\r\n`, `\n` and `\r` all end a line.
    pub fn push_text(&mut self, file_identifier: &str, text: &str) {
        for line in text.split(|c: char| c == '\r' || c == '\n') {
            if !line.is_empty() {
                self.push(file_identifier, line);
            }
        }
    }

    /// Current reassembly of one file. Does not drain, so calling it again after
    /// more lines arrive yields the newer full message.
    pub fn emit(&self, file_identifier: &str) -> Option<RawBlob> {
        self.buffers
            .get(file_identifier)
            .filter(|lines| !lines.is_empty())
            .map(|lines| RawBlob::new(file_identifier, lines.join(SEGMENT_TERMINATOR)))
    }

    /// Emit a file and forget it
    pub fn take(&mut self, file_identifier: &str) -> Option<RawBlob> {
        let blob = self.emit(file_identifier);
        self.buffers.remove(file_identifier);
        self.order.retain(|id| id != file_identifier);
        blob
    }

    /// Take every buffered file, in the order each was first seen
    pub fn drain(&mut self) -> Vec<RawBlob> {
        let order = std::mem::take(&mut self.order);
        let blobs: Vec<RawBlob> = order.iter().filter_map(|id| self.emit(id)).collect();
        self.buffers.clear();
        debug!("Drained {} files from assembler", blobs.len());
        blobs
    }

    pub fn file_count(&self) -> usize {
        self.order.len()
    }

    pub fn line_count(&self, file_identifier: &str) -> usize {
        self.buffers.get(file_identifier).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_files_keep_per_file_order() {
        let mut assembler = RawAssembler::new();
        assembler.push("A", "a1");
        assembler.push("A", "a2");
        assembler.push("B", "b1");
        assembler.push("A", "a3");

        assert_eq!(assembler.emit("A").unwrap().text, "a1\ra2\ra3");
        assert_eq!(assembler.emit("B").unwrap().text, "b1");
        assert_eq!(assembler.line_count("A"), 3);
    }

    #[test]
    fn test_emit_is_repeatable() {
        let mut assembler = RawAssembler::new();
        assembler.push("A", "MSH|^~\\&");
        let first = assembler.emit("A").unwrap();
        assert_eq!(assembler.emit("A").unwrap(), first);

        assembler.push("A", "PID|||1");
        assert_eq!(assembler.emit("A").unwrap().text, "MSH|^~\\&\rPID|||1");
    }

    #[test]
    fn test_unknown_file_is_never_emitted() {
        let mut assembler = RawAssembler::new();
        assert!(assembler.emit("missing").is_none());
        assert!(assembler.take("missing").is_none());
        assert!(assembler.drain().is_empty());
    }

    #[test]
    fn test_push_text_and_drain_in_first_seen_order() {
        let mut assembler = RawAssembler::new();
        assembler.push_text("second.hl7", "MSH|^~\\&|B\r\nPID|||2\r\n");
        assembler.push_text("first.hl7", "MSH|^~\\&|A\nPID|||1\n");

        let blobs = assembler.drain();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].file_identifier, "second.hl7");
        assert_eq!(blobs[0].text, "MSH|^~\\&|B\rPID|||2");
        assert_eq!(blobs[1].text, "MSH|^~\\&|A\rPID|||1");
        assert_eq!(assembler.file_count(), 0);
    }

    #[test]
    fn test_leading_byte_order_mark_is_stripped() {
        let mut assembler = RawAssembler::new();
        assembler.push_text("bom.hl7", "\u{feff}MSH|^~\\&|A|B|C|D|20240101||ADT^A01\r\nPID|||1||Doe^J\r\n");

        let blob = assembler.take("bom.hl7").unwrap();
        assert!(blob.text.starts_with("MSH|"));

        let msg = crate::parse(&blob);
        assert!(!msg.is_error());
        assert_eq!(msg.message_type.as_deref(), Some("ADT^A01"));
    }

    #[test]
    fn test_take_forgets_file() {
        let mut assembler = RawAssembler::new();
        assembler.push("A", "x");
        assembler.push("B", "y");

        assert_eq!(assembler.take("A").unwrap().text, "x");
        assert_eq!(assembler.file_count(), 1);
        assert!(assembler.emit("A").is_none());
    }
}
