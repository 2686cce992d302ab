use crate::projection::{project_all, project_typed, MessageProjection, ProjectedRecord};
use crate::schemas::{all_schemas, SegmentSchema};
use crate::ParsedMessage;
use tracing::{debug, info, warn};

/// SchemaRegistry - holds the typed views and projects messages onto them
///
/// ## Adding a Segment Type
///
/// Add a row to `SEGMENT_FIELD_RANGES` in `schemas.rs`, or call `register` at
/// runtime for site-specific segments (Z-segments). No changes to this file are
/// required.
pub struct SchemaRegistry {
    schemas: Vec<SegmentSchema>,
}

impl SchemaRegistry {
    /// Create a registry holding every schema from `schemas::all_schemas()`
    pub fn new() -> Self {
        let schemas = all_schemas();

        info!(
            "Registered {} segment schemas: {}",
            schemas.len(),
            schemas
                .iter()
                .map(|s| s.segment_id())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Self { schemas }
    }

    /// Register a schema, replacing any existing one for the same segment id
    pub fn register(&mut self, schema: SegmentSchema) {
        info!(
            "Registering segment schema: {} ({} columns)",
            schema.segment_id(),
            schema.columns().len()
        );

        match self
            .schemas
            .iter_mut()
            .find(|s| s.segment_id() == schema.segment_id())
        {
            Some(existing) => {
                debug!("Replacing schema for {}", schema.segment_id());
                *existing = schema;
            }
            None => self.schemas.push(schema),
        }
    }

    /// Get schema by segment id
    pub fn get_schema(&self, segment_id: &str) -> Option<&SegmentSchema> {
        let result = self.schemas.iter().find(|s| s.segment_id() == segment_id);

        if result.is_none() {
            debug!("No schema for segment type: {}", segment_id);
        }

        result
    }

    /// Get schema by output table name, e.g. `gold_pid`
    pub fn get_schema_by_table(&self, table: &str) -> Option<&SegmentSchema> {
        self.schemas.iter().find(|s| s.table_name() == table)
    }

    pub fn schemas(&self) -> &[SegmentSchema] {
        &self.schemas
    }

    /// Typed rows of one segment type, `None` if the type has no schema
    pub fn project_typed(
        &self,
        msg: &ParsedMessage,
        segment_id: &str,
    ) -> Option<Vec<ProjectedRecord>> {
        match self.get_schema(segment_id) {
            Some(schema) => Some(project_typed(msg, schema)),
            None => {
                warn!("Typed projection requested for unsupported segment: {}", segment_id);
                None
            }
        }
    }

    /// Generic rows plus the typed rows of every registered schema
    pub fn project(&self, msg: &ParsedMessage) -> MessageProjection {
        let typed = self
            .schemas
            .iter()
            .map(|schema| (schema.segment_id().to_string(), project_typed(msg, schema)))
            .collect();

        MessageProjection {
            all: project_all(msg),
            typed,
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_parser::parse_text;

    const ADT: &str = "MSH|^~\\&|A|B|C|D|20240101||ADT^A01|1|P|2.5\r\
EVN|A01|20240101\r\
PID|||42||Doe^Jane\r\
PV1|1|I||||||||||||||||||||||||||||||||||||||||||||||||||||X54\r\
AL1|1|DA|PEN\r\
AL1|2|FA|NUT\r\
ZPD|site";

    #[test]
    fn test_registry_project_typed_pid() {
        let registry = SchemaRegistry::new();
        let msg = parse_text(ADT).unwrap();

        let pid = registry.project_typed(&msg, "PID").unwrap();
        assert_eq!(pid.len(), 1);
        assert_eq!(pid[0].columns.len(), 30);
        assert_eq!(pid[0].get("PID_5"), Some("Doe^Jane"));
    }

    #[test]
    fn test_registry_unsupported_type() {
        let registry = SchemaRegistry::new();
        let msg = parse_text(ADT).unwrap();

        assert!(registry.project_typed(&msg, "ZPD").is_none());
        assert!(registry
            .project(&msg)
            .all
            .iter()
            .any(|r| r.segment_id == "ZPD"));
    }

    #[test]
    fn test_registry_project_fans_out() {
        let registry = SchemaRegistry::new();
        let msg = parse_text(ADT).unwrap();
        let projection = registry.project(&msg);

        assert_eq!(projection.all.len(), 7);
        assert_eq!(projection.typed.len(), 8);
        assert_eq!(projection.typed["AL1"].len(), 2);
        assert_eq!(projection.typed["EVN"].len(), 1);
        assert!(projection.typed["OBX"].is_empty());
        assert_eq!(projection.typed["PV1"][0].get("PV1_54"), Some("X54"));
    }

    #[test]
    fn test_register_custom_schema() {
        let mut registry = SchemaRegistry::new();
        registry.register(SegmentSchema::from_ranges("ZPD", &[1..=2]));
        let msg = parse_text(ADT).unwrap();

        let zpd = registry.project_typed(&msg, "ZPD").unwrap();
        assert_eq!(zpd[0].get("ZPD_1"), Some("site"));
        assert_eq!(registry.get_schema_by_table("gold_zpd").unwrap().columns().len(), 2);
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = SchemaRegistry::new();
        let before = registry.schemas().len();
        registry.register(SegmentSchema::from_ranges("CTI", &[1..=2]));

        assert_eq!(registry.schemas().len(), before);
        assert_eq!(registry.get_schema("CTI").unwrap().columns().len(), 2);
    }
}
