use crate::schemas::SegmentSchema;
use crate::{ParsedMessage, Segment};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One row of the catch-all view: a segment with its full field map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericRecord {
    pub message_type: Option<String>,
    pub message_datetime: Option<String>,
    pub patient_id: Option<String>,
    pub segment_id: String,
    pub fields: IndexMap<String, String>,
}

/// One row of a typed view. `columns` always holds the schema's full column
/// list in schema order, `None` where the segment lacks the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedRecord {
    pub message_type: Option<String>,
    pub message_datetime: Option<String>,
    pub patient_id: Option<String>,
    pub segment_id: String,
    #[serde(flatten)]
    pub columns: IndexMap<String, Option<String>>,
}

impl ProjectedRecord {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(|v| v.as_deref())
    }
}

/// Every view derived from one message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageProjection {
    pub all: Vec<GenericRecord>,
    /// Typed rows keyed by segment id, one entry per registered schema
    pub typed: IndexMap<String, Vec<ProjectedRecord>>,
}

/// One generic record per segment, in message order
pub fn project_all(msg: &ParsedMessage) -> Vec<GenericRecord> {
    msg.segments
        .iter()
        .map(|segment| GenericRecord {
            message_type: msg.message_type.clone(),
            message_datetime: msg.message_datetime.clone(),
            patient_id: msg.patient_id.clone(),
            segment_id: segment.segment_id.clone(),
            fields: segment.fields.clone(),
        })
        .collect()
}

/// One fixed-column record per segment matching the schema's type. Fields
/// outside the schema are dropped.
pub fn project_typed(msg: &ParsedMessage, schema: &SegmentSchema) -> Vec<ProjectedRecord> {
    msg.segments
        .iter()
        .filter(|segment| segment.segment_id == schema.segment_id())
        .map(|segment| project_segment(msg, segment, schema))
        .collect()
}

fn project_segment(msg: &ParsedMessage, segment: &Segment, schema: &SegmentSchema) -> ProjectedRecord {
    let columns = schema
        .columns()
        .iter()
        .map(|column| (column.clone(), segment.fields.get(column).cloned()))
        .collect();

    ProjectedRecord {
        message_type: msg.message_type.clone(),
        message_datetime: msg.message_datetime.clone(),
        patient_id: msg.patient_id.clone(),
        segment_id: segment.segment_id.clone(),
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_parser::parse_text;
    use crate::schemas::all_schemas;

    const ORU: &str = "MSH|^~\\&|LAB|H|EHR|H|20240301083000||ORU^R01|77|P|2.5\r\
PID|||555^^^MRN||Roe^Jane\r\
OBR|1|A1|B1|CBC\r\
OBX|1|NM|HGB||13.2|g/dL\r\
OBX|2|NM|WBC||6.1|10*3/uL\r\
OBX|3|NM|PLT||250|10*3/uL||||||||||||||||||||||||||||EXTRA\r\
ZZ1|custom|data";

    fn schema(id: &str) -> SegmentSchema {
        all_schemas()
            .into_iter()
            .find(|s| s.segment_id() == id)
            .unwrap()
    }

    #[test]
    fn test_project_all_one_record_per_segment_in_order() {
        let msg = parse_text(ORU).unwrap();
        let all = project_all(&msg);

        assert_eq!(all.len(), msg.segments.len());
        let ids: Vec<&str> = all.iter().map(|r| r.segment_id.as_str()).collect();
        assert_eq!(ids, vec!["MSH", "PID", "OBR", "OBX", "OBX", "OBX", "ZZ1"]);
        assert_eq!(all[6].fields["ZZ1_1"], "custom");
        assert!(all.iter().all(|r| r.patient_id.as_deref() == Some("555^^^MRN")));
    }

    #[test]
    fn test_project_typed_one_row_per_occurrence() {
        let msg = parse_text(ORU).unwrap();
        let obx = project_typed(&msg, &schema("OBX"));

        assert_eq!(obx.len(), 3);
        assert_eq!(obx[1].get("OBX_3"), Some("WBC"));
        assert_eq!(obx[1].get("OBX_5"), Some("6.1"));
        assert!(obx.iter().all(|r| r.columns.len() == 33));
        assert!(obx.iter().all(|r| r.message_type.as_deref() == Some("ORU^R01")));
    }

    #[test]
    fn test_project_typed_drops_unknown_fields() {
        let msg = parse_text(ORU).unwrap();
        let obx = project_typed(&msg, &schema("OBX"));

        // OBX-34 exists in the source but is outside the schema
        assert!(msg.segments[5].fields.contains_key("OBX_34"));
        assert!(!obx[2].columns.contains_key("OBX_34"));
    }

    #[test]
    fn test_project_typed_pid_row() {
        let text = "MSH|^~\\&|SysA|FacA|SysB|FacB|20230101120000||ADT^A01|MSG001|P|2.5\rPID|||12345^^^MRN||Doe^John\r";
        let msg = parse_text(text).unwrap();
        let pid = project_typed(&msg, &schema("PID"));

        assert_eq!(pid.len(), 1);
        let row = &pid[0];
        assert_eq!(row.columns.len(), 30);
        assert_eq!(row.get("PID_3"), Some("12345^^^MRN"));
        assert_eq!(row.get("PID_5"), Some("Doe^John"));
        let present = row.columns.values().filter(|v| v.is_some()).count();
        assert_eq!(present, 2);
        assert_eq!(row.columns.keys().next().map(String::as_str), Some("PID_1"));
    }

    #[test]
    fn test_project_typed_without_matches() {
        let msg = parse_text(ORU).unwrap();
        assert!(project_typed(&msg, &schema("AL1")).is_empty());
    }

    #[test]
    fn test_error_message_projects_only_generic() {
        let msg = crate::parse(&crate::RawBlob::new("bad", "junk"));

        let all = project_all(&msg);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].segment_id, "ERROR");
        assert!(all_schemas()
            .iter()
            .all(|s| project_typed(&msg, s).is_empty()));
    }

    #[test]
    fn test_projected_record_serializes_flat() {
        let msg = parse_text("PID|||1").unwrap();
        let schema = SegmentSchema::new("PID", vec!["PID_1".into(), "PID_3".into()]);
        let row = &project_typed(&msg, &schema)[0];

        let json = serde_json::to_value(row).unwrap();
        assert_eq!(json["segment_id"], "PID");
        assert_eq!(json["PID_3"], "1");
        assert!(json["PID_1"].is_null());
    }
}
