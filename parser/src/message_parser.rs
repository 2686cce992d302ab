use crate::encoding::{detect_delimiters, segment_id, Delimiters};
use crate::extractor::{extract_header, field_name};
use crate::{ParseError, ParsedMessage, RawBlob, Segment};
use tracing::{debug, warn};

/// Parse one reassembled message.
///
/// Never fails: a message that cannot be split into segments comes back as a
/// single `ERROR` segment carrying the failure description, with every header
/// field empty.
pub fn parse(blob: &RawBlob) -> ParsedMessage {
    match parse_text(&blob.text) {
        Ok(msg) => {
            debug!(
                "Parsed {} segments from '{}'",
                msg.segments.len(),
                blob.file_identifier
            );
            msg
        }
        Err(e) => {
            warn!("Malformed message in '{}': {}", blob.file_identifier, e);
            ParsedMessage::error(e.to_string())
        }
    }
}

/// Strict variant of [`parse`] that reports the failure instead of folding it
/// into an ERROR segment.
pub fn parse_text(text: &str) -> Result<ParsedMessage, ParseError> {
    let segments = parse_segments(text)?;
    let header = extract_header(&segments);
    Ok(ParsedMessage::from_parts(header, segments))
}

/// Split a message into its flat, ordered segment list
pub fn parse_segments(text: &str) -> Result<Vec<Segment>, ParseError> {
    let normalized = text.replace('\n', "\r");
    let lines: Vec<&str> = normalized
        .split('\r')
        .filter(|line| !line.trim().is_empty())
        .collect();

    if lines.is_empty() {
        return Err(ParseError::Empty);
    }

    let delimiters = detect_delimiters(lines.iter().copied());

    lines
        .iter()
        .map(|line| parse_segment(line, &delimiters))
        .collect()
}

fn parse_segment(line: &str, delimiters: &Delimiters) -> Result<Segment, ParseError> {
    let id = segment_id(line, delimiters)?;
    let mut segment = Segment::new(id);
    let mut index = 1;

    // MSH-1 is the separator itself, so the split values start at MSH-2
    if id == "MSH" {
        insert_field(&mut segment, 1, &delimiters.field.to_string());
        index = 2;
    }

    for value in line.split(delimiters.field).skip(1) {
        insert_field(&mut segment, index, value);
        index += 1;
    }

    Ok(segment)
}

fn insert_field(segment: &mut Segment, index: usize, value: &str) {
    if value.is_empty() {
        return;
    }
    let name = field_name(&segment.segment_id, index);
    segment.fields.insert(name, value.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADT_A01: &str =
        "MSH|^~\\&|SysA|FacA|SysB|FacB|20230101120000||ADT^A01|MSG001|P|2.5\rPID|||12345^^^MRN||Doe^John\r";

    #[test]
    fn test_parse_adt_a01_end_to_end() {
        let msg = parse(&RawBlob::new("adt.hl7", ADT_A01));

        assert!(!msg.is_error());
        assert_eq!(msg.message_type.as_deref(), Some("ADT^A01"));
        assert_eq!(msg.message_datetime.as_deref(), Some("20230101120000"));
        assert_eq!(msg.patient_id.as_deref(), Some("12345^^^MRN"));
        assert_eq!(msg.patient_name.as_deref(), Some("Doe^John"));
        assert_eq!(msg.segments.len(), 2);
    }

    #[test]
    fn test_msh_field_numbering() {
        let msg = parse_text(ADT_A01).unwrap();
        let msh = &msg.segments[0];

        assert_eq!(msh.fields["MSH_1"], "|");
        assert_eq!(msh.fields["MSH_2"], "^~\\&");
        assert_eq!(msh.fields["MSH_3"], "SysA");
        assert_eq!(msh.fields["MSH_7"], "20230101120000");
        assert!(!msh.fields.contains_key("MSH_8"));
        assert_eq!(msh.fields["MSH_12"], "2.5");
        assert_eq!(msh.fields.len(), 11);
    }

    #[test]
    fn test_empty_fields_are_absent() {
        let msg = parse_text(ADT_A01).unwrap();
        let pid = &msg.segments[1];

        assert_eq!(pid.segment_id, "PID");
        assert_eq!(pid.fields.len(), 2);
        assert_eq!(pid.fields["PID_3"], "12345^^^MRN");
        assert_eq!(pid.fields["PID_5"], "Doe^John");
        assert!(pid.fields.values().all(|v| !v.is_empty()));
    }

    #[test]
    fn test_line_feeds_are_normalized() {
        let text = "MSH|^~\\&|A|B|C|D|20240505||ORU^R01|1|P|2.5\nPID|||77||Roe^Jane\r\nOBX|1|NM|GLU||5.4\n";
        let msg = parse_text(text).unwrap();

        let ids: Vec<&str> = msg.segments.iter().map(|s| s.segment_id.as_str()).collect();
        assert_eq!(ids, vec!["MSH", "PID", "OBX"]);
        assert_eq!(msg.segments[2].fields["OBX_5"], "5.4");
    }

    #[test]
    fn test_custom_field_separator() {
        let text = "MSH#^~\\&#A#B#C#D#20240101##ADT^A04\rPID###42";
        let msg = parse_text(text).unwrap();

        assert_eq!(msg.message_type.as_deref(), Some("ADT^A04"));
        assert_eq!(msg.patient_id.as_deref(), Some("42"));
        assert_eq!(msg.segments[0].fields["MSH_1"], "#");
    }

    #[test]
    fn test_without_msh_uses_default_delimiters() {
        let msg = parse(&RawBlob::new("pid-only", "PID|||555||Poe^Ed"));

        assert!(!msg.is_error());
        assert!(msg.message_type.is_none());
        assert_eq!(msg.patient_name.as_deref(), Some("Poe^Ed"));
    }

    #[test]
    fn test_missing_pid_name_keeps_msh_fields() {
        let text = "MSH|^~\\&|A|B|C|D|20230101120000||ADT^A01\rPID|||12345";
        let msg = parse(&RawBlob::new("x", text));

        assert_eq!(msg.message_type.as_deref(), Some("ADT^A01"));
        assert_eq!(msg.message_datetime.as_deref(), Some("20230101120000"));
        assert_eq!(msg.patient_id.as_deref(), Some("12345"));
        assert!(msg.patient_name.is_none());
    }

    #[test]
    fn test_repetitions_and_components_kept_raw() {
        let msg = parse_text("PID|||1~2||A^B&C").unwrap();
        assert_eq!(msg.segments[0].fields["PID_3"], "1~2");
        assert_eq!(msg.segments[0].fields["PID_5"], "A^B&C");
    }

    #[test]
    fn test_malformed_inputs_fail_soft() {
        for text in ["", "\r\n\r", "not an hl7 message", "MSHA^~\\&A", "MSH|^~\\&|A\rpv1|1"] {
            let msg = parse(&RawBlob::new("bad", text));

            assert!(msg.is_error(), "expected error for {:?}", text);
            assert_eq!(msg.segments.len(), 1);
            assert_eq!(msg.segments[0].segment_id, "ERROR");
            assert!(msg.error_description().is_some());
            assert!(msg.message_type.is_none());
            assert!(msg.message_datetime.is_none());
            assert!(msg.patient_id.is_none());
            assert!(msg.patient_name.is_none());
        }
    }

    #[test]
    fn test_bad_msh_encoding_falls_back_to_defaults() {
        let text = "MSH|^~|A|B|C|D|20230101||ADT^A01\rPID|||1||Doe^J";
        let msg = parse(&RawBlob::new("x", text));

        assert!(!msg.is_error());
        assert_eq!(msg.segments.len(), 2);
        assert_eq!(msg.message_type.as_deref(), Some("ADT^A01"));
        assert_eq!(msg.message_datetime.as_deref(), Some("20230101"));
        assert_eq!(msg.patient_name.as_deref(), Some("Doe^J"));
        assert_eq!(msg.segments[0].fields["MSH_1"], "|");
        assert_eq!(msg.segments[0].fields["MSH_2"], "^~");
    }

    #[test]
    fn test_error_description_is_readable() {
        let msg = parse(&RawBlob::new("empty", ""));
        assert_eq!(msg.error_description(), Some("message contains no segments"));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let blob = RawBlob::new("adt.hl7", ADT_A01);
        assert_eq!(parse(&blob), parse(&blob));

        let bad = RawBlob::new("bad", "garbage");
        assert_eq!(parse(&bad), parse(&bad));
    }
}
