//! Central segment schema table
//!
//! Each supported segment type is one row here: the segment id and the field
//! ranges projected into its fixed-column view. To support another segment
//! type, add a row; nothing in the projector or registry changes.

use crate::extractor::field_name;
use std::ops::RangeInclusive;
use tracing::info;

/// Segment id and the inclusive field ranges of its typed view
pub const SEGMENT_FIELD_RANGES: &[(&str, &[RangeInclusive<usize>])] = &[
    ("MSH", &[1..=19]),
    ("PID", &[1..=30]),
    ("EVN", &[1..=7]),
    // PV1-41..50 are not projected. Kept as received; review before filling in.
    ("PV1", &[1..=40, 51..=54]),
    ("OBR", &[1..=47]),
    ("OBX", &[1..=33]),
    ("CTI", &[1..=4]),
    ("AL1", &[1..=6]),
];

/// Fixed, ordered column list of one segment type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSchema {
    segment_id: String,
    columns: Vec<String>,
}

impl SegmentSchema {
    pub fn new(segment_id: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            segment_id: segment_id.into(),
            columns,
        }
    }

    /// Build the column list `<ID>_<n>` for every index in `ranges`, in order
    pub fn from_ranges(segment_id: &str, ranges: &[RangeInclusive<usize>]) -> Self {
        let columns = ranges
            .iter()
            .flat_map(|range| range.clone())
            .map(|index| field_name(segment_id, index))
            .collect();
        Self::new(segment_id, columns)
    }

    pub fn segment_id(&self) -> &str {
        &self.segment_id
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Name of the output table holding this segment type's rows
    pub fn table_name(&self) -> String {
        format!("gold_{}", self.segment_id.to_ascii_lowercase())
    }
}

/// Returns the schemas of every supported segment type, in table order.
pub fn all_schemas() -> Vec<SegmentSchema> {
    info!("Building segment schema table");

    SEGMENT_FIELD_RANGES
        .iter()
        .map(|(segment_id, ranges)| SegmentSchema::from_ranges(segment_id, ranges))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(id: &str) -> SegmentSchema {
        all_schemas()
            .into_iter()
            .find(|s| s.segment_id() == id)
            .unwrap()
    }

    #[test]
    fn test_column_counts() {
        let expected = [
            ("MSH", 19),
            ("PID", 30),
            ("EVN", 7),
            ("PV1", 44),
            ("OBR", 47),
            ("OBX", 33),
            ("CTI", 4),
            ("AL1", 6),
        ];
        for (id, count) in expected {
            assert_eq!(schema(id).columns().len(), count, "{}", id);
        }
    }

    #[test]
    fn test_pv1_skips_41_to_50() {
        let pv1 = schema("PV1");
        let cols = pv1.columns();

        assert_eq!(cols[39], "PV1_40");
        assert_eq!(cols[40], "PV1_51");
        assert_eq!(cols.last().map(String::as_str), Some("PV1_54"));
        assert!(!cols.iter().any(|c| c == "PV1_45"));
    }

    #[test]
    fn test_table_name() {
        assert_eq!(schema("AL1").table_name(), "gold_al1");
    }
}
