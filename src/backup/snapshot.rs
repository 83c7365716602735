//! Snapshot document
//!
//! ```json
//! { "metadata": { "timestamp": "...", "version": "1.0" },
//!   "data": { "currencies": [...], "proposals": [...], ... } }
//! ```
//!
//! Rows are kept as raw JSON objects keyed by column name, so the snapshot
//! carries whatever the tables hold without a typed model per table.
//! Uploaded rows may use camelCase field names (`isDefault`, `createdAt`);
//! they are normalized to snake_case column names on the way in.

use crate::backup::Entity;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Format version written into every snapshot
pub const SNAPSHOT_VERSION: &str = "1.0";

/// One table row, keyed by column name
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl SnapshotMetadata {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            version: SNAPSHOT_VERSION.to_string(),
        }
    }
}

/// Full export document
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub data: SnapshotData,
}

/// Rows per entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotData {
    tables: BTreeMap<Entity, Vec<Row>>,
}

impl SnapshotData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity, rows: Vec<Row>) {
        self.tables.insert(entity, rows);
    }

    pub fn rows(&self, entity: Entity) -> &[Row] {
        self.tables.get(&entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Row count for every entity, keyed by snapshot key
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        Entity::ALL
            .into_iter()
            .map(|entity| (entity.snapshot_key(), self.rows(entity).len()))
            .collect()
    }

    pub fn into_tables(self) -> BTreeMap<Entity, Vec<Row>> {
        self.tables
    }

    /// Parse the `data` block of an uploaded snapshot.
    ///
    /// A `null` list means "nothing to restore" for that entity; unknown
    /// keys are skipped.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(blocks) = value else {
            return Err("`data` must be an object".to_string());
        };

        let mut data = SnapshotData::new();
        for (key, value) in blocks {
            let Some(entity) = Entity::from_snapshot_key(&key) else {
                warn!("Ignoring unknown snapshot key: {}", key);
                continue;
            };
            if value.is_null() {
                continue;
            }
            data.insert(entity, Self::rows_from_value(entity, value)?);
        }

        Ok(data)
    }

    /// A JSON array of row objects
    pub fn rows_from_value(entity: Entity, value: Value) -> Result<Vec<Row>, String> {
        let Value::Array(items) = value else {
            return Err(format!("`{}` must be a list", entity.snapshot_key()));
        };

        items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(row) => Ok(row
                    .into_iter()
                    .map(|(key, value)| (column_name(&key), value))
                    .collect()),
                _ => Err(format!(
                    "`{}[{}]` must be an object",
                    entity.snapshot_key(),
                    idx
                )),
            })
            .collect()
    }
}

/// `createdAt` -> `created_at`; snake_case names pass through unchanged
pub fn column_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (idx, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if idx > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl Serialize for SnapshotData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Entity::ALL.len()))?;
        for entity in Entity::ALL {
            map.serialize_entry(entity.snapshot_key(), self.rows(entity))?;
        }
        map.end()
    }
}

/// Body of `POST /api/backup/import`
#[derive(Debug, Default, Deserialize)]
pub struct RestoreRequest {
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_serializes_every_entity() {
        let mut data = SnapshotData::new();
        data.insert(
            Entity::Currency,
            vec![json!({ "id": 1, "code": "TL" }).as_object().unwrap().clone()],
        );

        let value = serde_json::to_value(&data).unwrap();
        let blocks = value.as_object().unwrap();
        assert_eq!(blocks.len(), 13);
        assert_eq!(blocks["currencies"], json!([{ "id": 1, "code": "TL" }]));
        assert_eq!(blocks["proposalItems"], json!([]));
    }

    #[test]
    fn test_from_value_skips_null_and_unknown() {
        let data = SnapshotData::from_value(json!({
            "currencies": [{ "id": 1 }],
            "caries": null,
            "users": [{ "id": 9 }]
        }))
        .unwrap();

        assert_eq!(data.rows(Entity::Currency).len(), 1);
        assert!(data.rows(Entity::Cari).is_empty());
        assert_eq!(data.counts()["currencies"], 1);
        assert_eq!(data.counts()["caries"], 0);
    }

    #[test]
    fn test_from_value_rejects_bad_shapes() {
        assert!(SnapshotData::from_value(json!([1, 2])).is_err());
        assert!(SnapshotData::from_value(json!({ "currencies": {} })).is_err());

        let err = SnapshotData::from_value(json!({ "proposals": [{ "id": 1 }, 7] })).unwrap_err();
        assert_eq!(err, "`proposals[1]` must be an object");
    }

    #[test]
    fn test_column_name() {
        assert_eq!(column_name("isDefault"), "is_default");
        assert_eq!(column_name("defaultCurrencyId"), "default_currency_id");
        assert_eq!(column_name("created_at"), "created_at");
        assert_eq!(column_name("id"), "id");
    }

    #[test]
    fn test_camel_case_rows_are_normalized() {
        let data = SnapshotData::from_value(json!({
            "currencies": [{ "id": 1, "code": "TL", "isDefault": true, "createdAt": "2024-01-01T00:00:00.000Z" }]
        }))
        .unwrap();

        let row = &data.rows(Entity::Currency)[0];
        assert_eq!(row["is_default"], json!(true));
        assert_eq!(row["created_at"], json!("2024-01-01T00:00:00.000Z"));
        assert!(!row.contains_key("isDefault"));
    }

    #[test]
    fn test_round_trips_through_json() {
        let original = SnapshotData::from_value(json!({
            "currencies": [{ "id": 1, "code": "TL" }],
            "proposals": [{ "id": 4, "proposal_number": "TKL-2025-001" }]
        }))
        .unwrap();

        let text = serde_json::to_string(&original).unwrap();
        let parsed = SnapshotData::from_value(serde_json::from_str(&text).unwrap()).unwrap();

        // Empty lists come back as empty entries; compare by content.
        for entity in Entity::ALL {
            assert_eq!(parsed.rows(entity), original.rows(entity));
        }
    }
}
