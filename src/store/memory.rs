//! In-memory store
//!
//! Rows live as JSON objects keyed by column name, the same shape the
//! snapshot uses. Primary keys, unique columns and foreign keys are checked
//! against the entity graph the way PostgreSQL would check its constraints.
//! Every write runs against a copy of the tables that replaces the live
//! tables only when the whole operation succeeded.

use crate::backup::{Entity, OnDelete, RestorePlan, RestoreStep, Row, SnapshotData};
use crate::models::{Currency, CustomerSummary, Proposal, ProposalDraft, ProposalFilter, ProposalItem};
use crate::store::{Store, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: BTreeMap<Entity, BTreeMap<i64, Row>>,
}

impl Tables {
    fn table(&self, entity: Entity) -> impl Iterator<Item = (i64, &Row)> {
        self.rows
            .get(&entity)
            .into_iter()
            .flat_map(|rows| rows.iter().map(|(id, row)| (*id, row)))
    }

    fn get(&self, entity: Entity, id: i64) -> Option<&Row> {
        self.rows.get(&entity).and_then(|rows| rows.get(&id))
    }

    fn next_id(&self, entity: Entity) -> i64 {
        self.rows
            .get(&entity)
            .and_then(|rows| rows.keys().next_back())
            .map_or(1, |last| last + 1)
    }

    /// Insert a row, assigning the next id when the row has none
    fn insert(&mut self, entity: Entity, mut row: Row) -> Result<i64, StoreError> {
        let id = match row.get("id") {
            None | Some(Value::Null) => {
                let id = self.next_id(entity);
                row.insert("id".to_string(), json!(id));
                id
            }
            Some(value) => value.as_i64().ok_or_else(|| {
                StoreError::InvalidRecord(format!("{}.id must be an integer, got {}", entity, value))
            })?,
        };

        if self.get(entity, id).is_some() {
            return Err(StoreError::UniqueViolation {
                table: entity.table().to_string(),
                constraint: format!("{}_pkey", entity.table()),
            });
        }

        self.check_row(entity, id, &row)?;
        self.rows.entry(entity).or_default().insert(id, row);
        Ok(id)
    }

    /// Overwrite an existing row
    fn replace(&mut self, entity: Entity, id: i64, row: Row) -> Result<(), StoreError> {
        self.check_row(entity, id, &row)?;
        self.rows.entry(entity).or_default().insert(id, row);
        Ok(())
    }

    fn check_row(&self, entity: Entity, id: i64, row: &Row) -> Result<(), StoreError> {
        for column in entity.unique_columns() {
            let Some(value) = row.get(*column).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = self
                .table(entity)
                .any(|(other_id, other)| other_id != id && other.get(*column) == Some(value));
            if taken {
                return Err(StoreError::UniqueViolation {
                    table: entity.table().to_string(),
                    constraint: format!("{}_{}_key", entity.table(), column),
                });
            }
        }

        for fk in entity.foreign_keys() {
            let Some(value) = row.get(fk.column).filter(|v| !v.is_null()) else {
                continue;
            };
            let target_id = value.as_i64().ok_or_else(|| {
                StoreError::InvalidRecord(format!("{}.{} must be an integer", entity, fk.column))
            })?;
            if self.get(fk.target, target_id).is_none() {
                return Err(StoreError::ForeignKeyViolation(format!(
                    "insert or update on table \"{}\" violates foreign key constraint \"{}_{}_fkey\": {} = {} is not present in \"{}\"",
                    entity,
                    entity,
                    fk.column,
                    fk.column,
                    target_id,
                    fk.target
                )));
            }
        }

        Ok(())
    }

    /// Delete one row, cascading or refusing according to the referencing
    /// foreign keys. Returns `false` when the row did not exist.
    fn delete(&mut self, entity: Entity, id: i64) -> Result<bool, StoreError> {
        if self.get(entity, id).is_none() {
            return Ok(false);
        }

        for referrer in Entity::ALL {
            for fk in referrer.foreign_keys().iter().filter(|fk| fk.target == entity) {
                let referencing: Vec<i64> = self
                    .table(referrer)
                    .filter(|(_, row)| row.get(fk.column).and_then(Value::as_i64) == Some(id))
                    .map(|(rid, _)| rid)
                    .collect();

                if referencing.is_empty() {
                    continue;
                }

                match fk.on_delete {
                    OnDelete::Restrict => {
                        return Err(StoreError::ForeignKeyViolation(format!(
                            "update or delete on table \"{}\" violates foreign key constraint \"{}_{}_fkey\" on table \"{}\"",
                            entity, referrer, fk.column, referrer
                        )));
                    }
                    OnDelete::Cascade => {
                        for rid in referencing {
                            self.delete(referrer, rid)?;
                        }
                    }
                }
            }
        }

        if let Some(rows) = self.rows.get_mut(&entity) {
            rows.remove(&id);
        }
        Ok(true)
    }

    fn delete_all(&mut self, entity: Entity) -> Result<usize, StoreError> {
        let ids: Vec<i64> = self.table(entity).map(|(id, _)| id).collect();
        for id in &ids {
            self.delete(entity, *id)?;
        }
        Ok(ids.len())
    }

    fn read_proposal(&self, id: i64) -> Result<Option<Proposal>, StoreError> {
        let Some(row) = self.get(Entity::Proposal, id) else {
            return Ok(None);
        };

        let mut proposal: Proposal = from_row(row)?;
        proposal.customer = self
            .get(Entity::Cari, proposal.customer_id.into())
            .map(from_row::<CustomerSummary>)
            .transpose()?;
        proposal.currency = self
            .get(Entity::Currency, proposal.currency_id.into())
            .map(from_row::<Currency>)
            .transpose()?;
        proposal.items = self
            .table(Entity::ProposalItem)
            .filter(|(_, item)| item.get("proposal_id").and_then(Value::as_i64) == Some(id))
            .map(|(_, item)| from_row::<ProposalItem>(item))
            .collect::<Result<_, _>>()?;

        Ok(Some(proposal))
    }

    fn insert_items(&mut self, proposal_id: i64, draft: &ProposalDraft) -> Result<(), StoreError> {
        for item in &draft.items {
            let row = json!({
                "proposal_id": proposal_id,
                "stock_code": item.stock_code,
                "product_name": item.product_name,
                "brand": item.brand,
                "quantity": item.quantity,
                "unit": item.unit,
                "unit_price": item.unit_price,
                "vat_rate": item.vat_rate,
                "line_total": item.line_total,
                "description": item.description,
            });
            self.insert(Entity::ProposalItem, into_row(row))?;
        }
        Ok(())
    }
}

/// Thread-safe in-process store
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Store pre-filled with the currencies the proposal form offers
    pub async fn with_default_currencies() -> Result<Self, StoreError> {
        let store = Self::new();
        for (code, name, symbol, is_default) in [
            ("TL", "Türk Lirası", "₺", true),
            ("USD", "Amerikan Doları", "$", false),
            ("EUR", "Euro", "€", false),
        ] {
            store
                .insert_row(
                    Entity::Currency,
                    json!({
                        "code": code,
                        "name": name,
                        "symbol": symbol,
                        "is_default": is_default,
                        "created_at": Utc::now(),
                    }),
                )
                .await?;
        }
        Ok(store)
    }

    /// Insert a raw row; used for seeding
    pub async fn insert_row(&self, entity: Entity, row: Value) -> Result<i64, StoreError> {
        let row = match row {
            Value::Object(row) => row,
            other => {
                return Err(StoreError::InvalidRecord(format!(
                    "{} row must be an object, got {}",
                    entity, other
                )))
            }
        };
        self.write(|tables| tables.insert(entity, row)).await
    }

    /// Run `op` on a copy of the tables and publish the copy only on success
    async fn write<T>(
        &self,
        op: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut live = self.tables.write().await;
        let mut working = live.clone();
        let out = op(&mut working)?;
        *live = working;
        Ok(out)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn proposal_numbers_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .table(Entity::Proposal)
            .filter_map(|(_, row)| row.get("proposal_number").and_then(Value::as_str))
            .filter(|number| number.starts_with(prefix))
            .map(str::to_string)
            .collect())
    }

    async fn create_proposal(
        &self,
        proposal_number: &str,
        draft: &ProposalDraft,
    ) -> Result<Proposal, StoreError> {
        let now = Utc::now();
        let mut row = proposal_row(draft);
        row.insert("proposal_number".to_string(), json!(proposal_number));
        row.insert("status".to_string(), json!(draft.status.unwrap_or_default()));
        row.insert("created_at".to_string(), json!(now));
        row.insert("updated_at".to_string(), json!(now));

        self.write(|tables| {
            let id = tables.insert(Entity::Proposal, row)?;
            tables.insert_items(id, draft)?;
            tables
                .read_proposal(id)?
                .ok_or_else(|| StoreError::InvalidRecord(format!("proposal {} vanished", id)))
        })
        .await
    }

    async fn get_proposal(&self, id: i32) -> Result<Option<Proposal>, StoreError> {
        self.tables.read().await.read_proposal(id.into())
    }

    async fn list_proposals(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, StoreError> {
        let tables = self.tables.read().await;
        let mut proposals = Vec::new();
        for (id, _) in tables.table(Entity::Proposal) {
            if let Some(proposal) = tables.read_proposal(id)? {
                if filter.matches(&proposal) {
                    proposals.push(proposal);
                }
            }
        }

        proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(proposals)
    }

    async fn update_proposal(
        &self,
        id: i32,
        draft: &ProposalDraft,
    ) -> Result<Option<Proposal>, StoreError> {
        let id = i64::from(id);
        self.write(|tables| {
            let Some(existing) = tables.get(Entity::Proposal, id).cloned() else {
                return Ok(None);
            };

            let item_ids: Vec<i64> = tables
                .table(Entity::ProposalItem)
                .filter(|(_, item)| item.get("proposal_id").and_then(Value::as_i64) == Some(id))
                .map(|(item_id, _)| item_id)
                .collect();
            for item_id in item_ids {
                tables.delete(Entity::ProposalItem, item_id)?;
            }

            let mut row = proposal_row(draft);
            for column in ["id", "proposal_number", "created_at"] {
                if let Some(value) = existing.get(column) {
                    row.insert(column.to_string(), value.clone());
                }
            }
            let status = match draft.status {
                Some(status) => json!(status),
                None => existing.get("status").cloned().unwrap_or(Value::Null),
            };
            row.insert("status".to_string(), status);
            row.insert("updated_at".to_string(), json!(Utc::now()));

            tables.replace(Entity::Proposal, id, row)?;
            tables.insert_items(id, draft)?;
            tables.read_proposal(id)
        })
        .await
    }

    async fn delete_proposal(&self, id: i32) -> Result<bool, StoreError> {
        self.write(|tables| tables.delete(Entity::Proposal, id.into())).await
    }

    async fn list_currencies(&self) -> Result<Vec<Currency>, StoreError> {
        let tables = self.tables.read().await;
        tables
            .table(Entity::Currency)
            .map(|(_, row)| from_row(row))
            .collect()
    }

    async fn export_rows(&self) -> Result<SnapshotData, StoreError> {
        let tables = self.tables.read().await;
        let mut data = SnapshotData::new();
        for entity in Entity::ALL {
            data.insert(entity, tables.table(entity).map(|(_, row)| row.clone()).collect());
        }
        Ok(data)
    }

    async fn apply_restore(&self, plan: &RestorePlan) -> Result<(), StoreError> {
        self.write(|tables| {
            for step in plan.steps() {
                match step {
                    RestoreStep::DeleteAll(entity) => {
                        let removed = tables.delete_all(*entity)?;
                        debug!("Wiped {} rows from {}", removed, entity);
                    }
                    RestoreStep::InsertMany { entity, rows } => {
                        for row in rows {
                            tables.insert(*entity, row.clone())?;
                        }
                        debug!("Restored {} rows into {}", rows.len(), entity);
                    }
                }
            }
            Ok(())
        })
        .await
    }
}

/// Proposal columns owned by the draft
fn proposal_row(draft: &ProposalDraft) -> Row {
    into_row(json!({
        "customer_id": draft.customer_id,
        "currency_id": draft.currency_id,
        "proposal_date": draft.proposal_date,
        "valid_until": draft.valid_until,
        "exchange_rate": draft.exchange_rate,
        "total_amount": draft.total_amount,
        "discount_rate": draft.discount_rate,
        "delivery_time": draft.delivery_time,
        "payment_terms": draft.payment_terms,
        "notes": draft.notes,
    }))
}

fn into_row(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}

/// Decode a snake_case row into a camelCase API model
fn from_row<T: DeserializeOwned>(row: &Row) -> Result<T, StoreError> {
    let camel: Row = row
        .iter()
        .map(|(column, value)| (camel_case(column), value.clone()))
        .collect();
    serde_json::from_value(Value::Object(camel)).map_err(|e| StoreError::InvalidRecord(e.to_string()))
}

fn camel_case(column: &str) -> String {
    let mut out = String::with_capacity(column.len());
    let mut upper = false;
    for c in column.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("proposal_number"), "proposalNumber");
        assert_eq!(camel_case("default_currency_id"), "defaultCurrencyId");
        assert_eq!(camel_case("id"), "id");
    }

    #[tokio::test]
    async fn test_assigns_sequential_ids() {
        let store = MemoryStore::with_default_currencies().await.unwrap();
        let currencies = store.list_currencies().await.unwrap();

        let ids: Vec<i32> = currencies.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(currencies[0].code, "TL");
        assert!(currencies[0].is_default);
    }

    #[tokio::test]
    async fn test_unique_column_is_enforced() {
        let store = MemoryStore::with_default_currencies().await.unwrap();
        let err = store
            .insert_row(Entity::Currency, json!({ "code": "USD", "name": "again" }))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_restrict_blocks_delete_of_referenced_row() {
        let store = MemoryStore::with_default_currencies().await.unwrap();
        store
            .insert_row(Entity::Cari, json!({ "title": "Acme", "default_currency_id": 1 }))
            .await
            .unwrap();

        let plan = RestorePlan::build(SnapshotData::new()).unwrap();
        // Wiping in graph order removes the account before the currency.
        store.apply_restore(&plan).await.unwrap();
        assert!(store.list_currencies().await.unwrap().is_empty());

        let store = MemoryStore::with_default_currencies().await.unwrap();
        store
            .insert_row(Entity::Cari, json!({ "title": "Acme", "default_currency_id": 1 }))
            .await
            .unwrap();
        let err = store
            .write(|tables| tables.delete_all(Entity::Currency))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
        assert_eq!(store.list_currencies().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cascade_removes_children() {
        let store = MemoryStore::with_default_currencies().await.unwrap();
        store
            .insert_row(Entity::Cari, json!({ "title": "Acme", "default_currency_id": 1 }))
            .await
            .unwrap();
        store
            .insert_row(Entity::Invoice, json!({ "invoice_number": "F-1", "cari_id": 1, "currency_id": 1 }))
            .await
            .unwrap();
        store
            .insert_row(Entity::InvoiceItem, json!({ "invoice_id": 1, "product_name": "x" }))
            .await
            .unwrap();

        let removed = store
            .write(|tables| tables.delete(Entity::Invoice, 1))
            .await
            .unwrap();
        assert!(removed);

        let data = store.export_rows().await.unwrap();
        assert!(data.rows(Entity::InvoiceItem).is_empty());
    }

    #[tokio::test]
    async fn test_dangling_reference_is_rejected() {
        let store = MemoryStore::new();
        let err = store
            .insert_row(Entity::ExchangeRate, json!({ "currency_id": 9, "rate": "32.5" }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
    }
}
