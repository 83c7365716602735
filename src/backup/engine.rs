//! Backup/restore engine
//!
//! Export reads every table through the store's consistent view. Restore
//! turns a snapshot into a [`RestorePlan`] (wipe everything children-first,
//! then reload parents-first) and hands the whole plan to the store, which
//! runs it as a single transaction.

use crate::backup::graph::{delete_order, restore_order, CycleError, Entity};
use crate::backup::snapshot::{RestoreRequest, Row, Snapshot, SnapshotData, SnapshotMetadata};
use crate::store::{Store, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum BackupError {
    /// The uploaded document is unusable; nothing was touched
    #[error("Invalid backup file: {0}")]
    Validation(String),

    #[error(transparent)]
    Graph(#[from] CycleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One step of a restore
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreStep {
    DeleteAll(Entity),
    InsertMany { entity: Entity, rows: Vec<Row> },
}

/// Ordered steps of a full restore
#[derive(Debug, Clone, PartialEq)]
pub struct RestorePlan {
    steps: Vec<RestoreStep>,
}

impl RestorePlan {
    /// Every table is wiped; only non-empty lists are inserted
    pub fn build(data: SnapshotData) -> Result<Self, CycleError> {
        let mut tables = data.into_tables();

        let mut steps: Vec<RestoreStep> = delete_order()?
            .into_iter()
            .map(RestoreStep::DeleteAll)
            .collect();

        for entity in restore_order()? {
            if let Some(rows) = tables.remove(&entity).filter(|rows| !rows.is_empty()) {
                steps.push(RestoreStep::InsertMany { entity, rows });
            }
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[RestoreStep] {
        &self.steps
    }

    /// Rows inserted per entity, keyed by snapshot key
    pub fn inserted_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts: BTreeMap<&'static str, usize> = Entity::ALL
            .into_iter()
            .map(|entity| (entity.snapshot_key(), 0))
            .collect();

        for step in &self.steps {
            if let RestoreStep::InsertMany { entity, rows } = step {
                counts.insert(entity.snapshot_key(), rows.len());
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreSummary {
    pub restored: BTreeMap<&'static str, usize>,
}

pub struct BackupEngine {
    store: Arc<dyn Store>,
}

impl BackupEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn export(&self) -> Result<Snapshot, BackupError> {
        let data = self.store.export_rows().await?;
        let snapshot = Snapshot {
            metadata: SnapshotMetadata::now(),
            data,
        };

        info!("Backup exported: {:?}", snapshot.data.counts());
        Ok(snapshot)
    }

    /// Replace the whole database with the snapshot content
    pub async fn restore(&self, request: RestoreRequest) -> Result<RestoreSummary, BackupError> {
        check_version(request.metadata.as_ref())?;

        let data = request
            .data
            .filter(|data| !data.is_null())
            .ok_or_else(|| BackupError::Validation("missing `data` block".to_string()))?;

        let data = SnapshotData::from_value(data).map_err(BackupError::Validation)?;
        let plan = RestorePlan::build(data)?;
        debug!("Restore plan has {} steps", plan.steps().len());

        self.store.apply_restore(&plan).await?;

        let summary = RestoreSummary {
            restored: plan.inserted_counts(),
        };
        info!("Backup restored: {:?}", summary.restored);
        Ok(summary)
    }
}

/// Only major version 1 snapshots are understood. Snapshots without a
/// version are accepted as-is.
fn check_version(metadata: Option<&Value>) -> Result<(), BackupError> {
    let version = metadata
        .and_then(|m| m.get("version"))
        .and_then(Value::as_str);

    match version {
        Some(v) if v.split('.').next() != Some("1") => Err(BackupError::Validation(format!(
            "unsupported snapshot version {}",
            v
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProposalItemRequest, ProposalRequest};
    use crate::proposal::{ProposalService, SequenceAllocator};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    async fn populated_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_row(Entity::Currency, json!({ "id": 1, "code": "TL", "name": "Türk Lirası", "is_default": true }))
            .await
            .unwrap();
        store
            .insert_row(Entity::Cari, json!({ "id": 1, "title": "Acme Ltd", "type": "CUSTOMER", "default_currency_id": 1 }))
            .await
            .unwrap();

        let proposals = ProposalService::new(store.clone(), SequenceAllocator::default());
        let request = ProposalRequest {
            proposal_number: None,
            customer_id: Some(crate::models::IdInput::Number(1)),
            currency_id: Some(crate::models::IdInput::Number(1)),
            proposal_date: None,
            valid_until: None,
            exchange_rate: None,
            total_amount: None,
            discount_rate: None,
            delivery_time: Some("2 hafta".to_string()),
            payment_terms: None,
            notes: None,
            status: None,
            items: ["Pompa", "Vana"]
                .into_iter()
                .map(|name| ProposalItemRequest {
                    stock_code: None,
                    product_name: name.to_string(),
                    brand: None,
                    quantity: 1.into(),
                    unit: None,
                    unit_price: 100.into(),
                    vat_rate: None,
                    line_total: None,
                    description: None,
                })
                .collect(),
        };
        proposals
            .create(request, NaiveDate::from_ymd_opt(2025, 5, 5).unwrap())
            .await
            .unwrap();

        store
    }

    #[test]
    fn test_plan_wipes_all_and_inserts_non_empty() {
        let mut data = SnapshotData::new();
        data.insert(Entity::ProposalItem, vec![row(json!({ "id": 1, "proposal_id": 1 }))]);
        data.insert(Entity::Currency, vec![row(json!({ "id": 1 }))]);
        data.insert(Entity::Cari, vec![]);

        let plan = RestorePlan::build(data).unwrap();
        let steps = plan.steps();

        assert_eq!(steps.len(), 13 + 2);
        assert_eq!(steps[0], RestoreStep::DeleteAll(Entity::SalesItem));
        assert_eq!(steps[12], RestoreStep::DeleteAll(Entity::Currency));
        assert!(matches!(&steps[13], RestoreStep::InsertMany { entity: Entity::Currency, .. }));
        assert!(matches!(&steps[14], RestoreStep::InsertMany { entity: Entity::ProposalItem, .. }));

        let counts = plan.inserted_counts();
        assert_eq!(counts["currencies"], 1);
        assert_eq!(counts["caries"], 0);
    }

    #[test]
    fn test_version_check() {
        assert!(check_version(None).is_ok());
        assert!(check_version(Some(&json!({ "version": "1.0" }))).is_ok());
        assert!(check_version(Some(&json!({ "version": "1.3" }))).is_ok());
        assert!(check_version(Some(&json!({}))).is_ok());
        assert!(matches!(
            check_version(Some(&json!({ "version": "2.0" }))),
            Err(BackupError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_export_counts() {
        let store = populated_store().await;
        let engine = BackupEngine::new(store);

        let snapshot = engine.export().await.unwrap();
        assert_eq!(snapshot.metadata.version, "1.0");

        let document = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(document["data"]["proposals"].as_array().unwrap().len(), 1);
        assert_eq!(document["data"]["proposalItems"].as_array().unwrap().len(), 2);
        assert_eq!(document["data"]["currencies"].as_array().unwrap().len(), 1);
        assert_eq!(document["data"]["invoices"], json!([]));
    }

    #[tokio::test]
    async fn test_export_import_round_trip_into_empty_store() {
        let source = BackupEngine::new(populated_store().await);
        let document = serde_json::to_value(source.export().await.unwrap()).unwrap();

        let target_store = Arc::new(MemoryStore::new());
        let target = BackupEngine::new(target_store.clone());
        let summary = target
            .restore(serde_json::from_value(document).unwrap())
            .await
            .unwrap();

        assert_eq!(summary.restored["proposals"], 1);
        assert_eq!(summary.restored["proposalItems"], 2);

        let original = source.export().await.unwrap().data;
        let restored = target.export().await.unwrap().data;
        for entity in Entity::ALL {
            assert_eq!(restored.rows(entity), original.rows(entity), "{}", entity);
        }

        let proposal = target_store.get_proposal(1).await.unwrap().unwrap();
        assert_eq!(proposal.proposal_number, "TKL-2025-001");
        assert_eq!(proposal.items.len(), 2);
    }

    #[tokio::test]
    async fn test_restore_accepts_camel_case_rows() {
        let store = Arc::new(MemoryStore::new());
        let engine = BackupEngine::new(store.clone());

        let request = RestoreRequest {
            metadata: Some(json!({ "version": "1.0" })),
            data: Some(json!({
                "currencies": [{ "id": 1, "code": "TL", "name": "Türk Lirası", "isDefault": true }],
                "caries": [{ "id": 3, "title": "Acme Ltd", "defaultCurrencyId": 1 }],
                "proposals": [{
                    "id": 9,
                    "proposalNumber": "TKL-2024-042",
                    "customerId": 3,
                    "currencyId": 1,
                    "proposalDate": "2024-11-02",
                    "exchangeRate": "1",
                    "totalAmount": "120",
                    "discountRate": "0",
                    "status": "SENT",
                    "createdAt": "2024-11-02T09:00:00.000Z",
                    "updatedAt": "2024-11-02T09:00:00.000Z"
                }],
                "proposalItems": [{
                    "id": 1,
                    "proposalId": 9,
                    "productName": "Pompa",
                    "quantity": "1",
                    "unit": "Adet",
                    "unitPrice": "100",
                    "vatRate": 20,
                    "lineTotal": "100"
                }]
            })),
        };
        engine.restore(request).await.unwrap();

        let proposal = store.get_proposal(9).await.unwrap().unwrap();
        assert_eq!(proposal.proposal_number, "TKL-2024-042");
        assert_eq!(proposal.items.len(), 1);
        assert_eq!(proposal.customer.map(|c| c.title), Some("Acme Ltd".to_string()));
        assert_eq!(proposal.currency.map(|c| c.is_default), Some(true));
    }

    #[tokio::test]
    async fn test_restore_replaces_existing_content() {
        let store = populated_store().await;
        let engine = BackupEngine::new(store.clone());

        let request = RestoreRequest {
            metadata: None,
            data: Some(json!({
                "currencies": [{ "id": 5, "code": "USD", "name": "Dolar", "is_default": false }]
            })),
        };
        engine.restore(request).await.unwrap();

        let data = store.export_rows().await.unwrap();
        assert_eq!(data.rows(Entity::Currency).len(), 1);
        assert_eq!(data.rows(Entity::Currency)[0]["code"], json!("USD"));
        assert!(data.rows(Entity::Proposal).is_empty());
        assert!(data.rows(Entity::Cari).is_empty());
    }

    #[tokio::test]
    async fn test_missing_data_is_validation_error_without_mutation() {
        let store = populated_store().await;
        let engine = BackupEngine::new(store.clone());
        let before = store.export_rows().await.unwrap();

        for request in [
            RestoreRequest::default(),
            RestoreRequest {
                metadata: None,
                data: Some(Value::Null),
            },
            RestoreRequest {
                metadata: None,
                data: Some(json!("oops")),
            },
        ] {
            let err = engine.restore(request).await.unwrap_err();
            assert!(matches!(err, BackupError::Validation(_)));
        }

        assert_eq!(store.export_rows().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_failed_restore_leaves_store_untouched() {
        let store = populated_store().await;
        let engine = BackupEngine::new(store.clone());
        let before = store.export_rows().await.unwrap();

        // The proposal points at an account the snapshot does not contain.
        let request = RestoreRequest {
            metadata: Some(json!({ "version": "1.0" })),
            data: Some(json!({
                "currencies": [{ "id": 1, "code": "TL", "name": "Türk Lirası", "is_default": true }],
                "proposals": [{
                    "id": 1,
                    "proposal_number": "TKL-2025-001",
                    "customer_id": 77,
                    "currency_id": 1
                }]
            })),
        };

        let err = engine.restore(request).await.unwrap_err();
        assert!(matches!(err, BackupError::Store(StoreError::ForeignKeyViolation(_))));
        assert_eq!(store.export_rows().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_snapshot_abort_restore() {
        let store = populated_store().await;
        let engine = BackupEngine::new(store.clone());
        let before = store.export_rows().await.unwrap();

        let request = RestoreRequest {
            metadata: None,
            data: Some(json!({
                "currencies": [
                    { "id": 1, "code": "TL", "name": "Türk Lirası", "is_default": true },
                    { "id": 1, "code": "USD", "name": "Dolar", "is_default": false }
                ]
            })),
        };

        let err = engine.restore(request).await.unwrap_err();
        assert!(matches!(err, BackupError::Store(StoreError::UniqueViolation { .. })));
        assert_eq!(store.export_rows().await.unwrap(), before);
    }
}
