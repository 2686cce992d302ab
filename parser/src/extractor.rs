use crate::{MessageHeader, Segment};

/// Header slots filled from segment fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderSlot {
    MessageType,
    MessageDatetime,
    PatientId,
    PatientName,
}

/// (segment id, field index, slot). Only the first segment of each id counts.
const HEADER_FIELDS: &[(&str, usize, HeaderSlot)] = &[
    ("MSH", 9, HeaderSlot::MessageType),
    ("MSH", 7, HeaderSlot::MessageDatetime),
    ("PID", 3, HeaderSlot::PatientId),
    ("PID", 5, HeaderSlot::PatientName),
];

/// Name of the field at a 1-based position, e.g. `PID_5`
pub fn field_name(segment_id: &str, index: usize) -> String {
    format!("{}_{}", segment_id, index)
}

/// Value of the field at a 1-based position, `None` when absent
pub fn get_field(segment: &Segment, index: usize) -> Option<&str> {
    segment
        .fields
        .get(&field_name(&segment.segment_id, index))
        .map(String::as_str)
}

/// First segment with the given id
pub fn first_segment<'a>(segments: &'a [Segment], segment_id: &str) -> Option<&'a Segment> {
    segments.iter().find(|s| s.segment_id == segment_id)
}

/// Pull message type, timestamp, patient id and patient name from the first
/// MSH and PID segments. A missing segment and a missing field are both `None`,
/// and each value is looked up independently of the others.
pub fn extract_header(segments: &[Segment]) -> MessageHeader {
    let mut header = MessageHeader::default();

    for (segment_id, index, slot) in HEADER_FIELDS {
        let value = first_segment(segments, segment_id)
            .and_then(|seg| get_field(seg, *index))
            .map(str::to_string);

        let target = match slot {
            HeaderSlot::MessageType => &mut header.message_type,
            HeaderSlot::MessageDatetime => &mut header.message_datetime,
            HeaderSlot::PatientId => &mut header.patient_id,
            HeaderSlot::PatientName => &mut header.patient_name,
        };
        *target = value;
    }

    header
}
