//! PostgreSQL store
//!
//! Typed queries for proposals, generic JSON-based copying for backups.

use crate::backup::{Entity, RestorePlan, RestoreStep, Row as SnapshotRow, SnapshotData};
use crate::db::queries;
use crate::models::{
    Currency, CustomerSummary, Proposal, ProposalDraft, ProposalFilter, ProposalItem, ProposalStatus,
};
use crate::store::{Store, StoreError};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use futures::future::try_join_all;
use postgres_types::ToSql;
use serde_json::Value;
use std::collections::HashMap;
use tokio_postgres::types::Json;
use tokio_postgres::{GenericClient, IsolationLevel, Row};
use tracing::{debug, info};

pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn proposal_from_row(row: &Row) -> Result<Proposal, StoreError> {
    let status: String = row.get("status");
    let status: ProposalStatus = status.parse().map_err(StoreError::InvalidRecord)?;
    let customer_id: i32 = row.get("customer_id");
    let currency_id: i32 = row.get("currency_id");

    // LEFT JOIN: the joined columns are NULL when the target row is missing
    let customer = row
        .get::<_, Option<String>>("customer_title")
        .map(|title| CustomerSummary {
            id: customer_id,
            title,
            email: row.get("customer_email"),
            phone: row.get("customer_phone"),
            address: row.get("customer_address"),
            tax_number: row.get("customer_tax_number"),
            tax_office: row.get("customer_tax_office"),
        });
    let currency = row
        .get::<_, Option<String>>("currency_code")
        .map(|code| Currency {
            id: currency_id,
            code,
            name: row.get("currency_name"),
            symbol: row.get("currency_symbol"),
            is_default: row.get("currency_is_default"),
        });

    Ok(Proposal {
        id: row.get("id"),
        proposal_number: row.get("proposal_number"),
        customer_id,
        currency_id,
        proposal_date: row.get("proposal_date"),
        valid_until: row.get("valid_until"),
        exchange_rate: row.get("exchange_rate"),
        total_amount: row.get("total_amount"),
        discount_rate: row.get("discount_rate"),
        delivery_time: row.get("delivery_time"),
        payment_terms: row.get("payment_terms"),
        notes: row.get("notes"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        customer,
        currency,
        items: Vec::new(),
    })
}

fn item_from_row(row: &Row) -> ProposalItem {
    ProposalItem {
        id: row.get("id"),
        proposal_id: row.get("proposal_id"),
        stock_code: row.get("stock_code"),
        product_name: row.get("product_name"),
        brand: row.get("brand"),
        quantity: row.get("quantity"),
        unit: row.get("unit"),
        unit_price: row.get("unit_price"),
        vat_rate: row.get("vat_rate"),
        line_total: row.get("line_total"),
        description: row.get("description"),
    }
}

/// Attach items to already loaded proposals with a single query
async fn load_items<C: GenericClient + Sync>(client: &C, proposals: &mut [Proposal]) -> Result<(), StoreError> {
    if proposals.is_empty() {
        return Ok(());
    }

    let ids: Vec<i32> = proposals.iter().map(|p| p.id).collect();
    let rows = client
        .query(queries::select_items_for_proposals().as_str(), &[&ids])
        .await?;

    let mut by_proposal: HashMap<i32, Vec<ProposalItem>> = HashMap::new();
    for row in &rows {
        let item = item_from_row(row);
        by_proposal.entry(item.proposal_id).or_default().push(item);
    }
    for proposal in proposals.iter_mut() {
        proposal.items = by_proposal.remove(&proposal.id).unwrap_or_default();
    }
    Ok(())
}

async fn fetch_proposal<C: GenericClient + Sync>(client: &C, id: i32) -> Result<Option<Proposal>, StoreError> {
    let Some(row) = client
        .query_opt(queries::select_proposal_by_id().as_str(), &[&id])
        .await?
    else {
        return Ok(None);
    };

    let mut proposals = vec![proposal_from_row(&row)?];
    load_items(client, &mut proposals).await?;
    Ok(proposals.pop())
}

async fn insert_items<C: GenericClient + Sync>(
    client: &C,
    proposal_id: i32,
    draft: &ProposalDraft,
) -> Result<(), StoreError> {
    for item in &draft.items {
        client
            .execute(
                queries::INSERT_PROPOSAL_ITEM,
                &[
                    &proposal_id,
                    &item.stock_code,
                    &item.product_name,
                    &item.brand,
                    &item.quantity,
                    &item.unit,
                    &item.unit_price,
                    &item.vat_rate,
                    &item.line_total,
                    &item.description,
                ],
            )
            .await?;
    }
    Ok(())
}

/// Split rows into batches that carry the same set of known columns, so each
/// batch can be inserted with an explicit column list. Keys that are not
/// columns of the table are dropped.
fn column_batches<'a>(
    entity: Entity,
    columns: &'a [String],
    rows: &'a [SnapshotRow],
) -> Result<Vec<(Vec<&'a str>, Vec<&'a SnapshotRow>)>, StoreError> {
    let mut batches: Vec<(Vec<&str>, Vec<&SnapshotRow>)> = Vec::new();
    for row in rows {
        let present: Vec<&str> = columns
            .iter()
            .map(String::as_str)
            .filter(|column| row.contains_key(*column))
            .collect();
        if present.is_empty() {
            return Err(StoreError::InvalidRecord(format!(
                "{} row has no known columns",
                entity
            )));
        }

        match batches.iter().position(|(known, _)| *known == present) {
            Some(idx) => batches[idx].1.push(row),
            None => batches.push((present, vec![row])),
        }
    }
    Ok(batches)
}

#[async_trait]
impl Store for PostgresStore {
    async fn proposal_numbers_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(queries::PROPOSAL_NUMBERS_WITH_PREFIX, &[&prefix])
            .await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn create_proposal(
        &self,
        proposal_number: &str,
        draft: &ProposalDraft,
    ) -> Result<Proposal, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let status = draft.status.unwrap_or_default().as_str();
        let row = tx
            .query_one(
                queries::INSERT_PROPOSAL,
                &[
                    &proposal_number,
                    &draft.customer_id,
                    &draft.currency_id,
                    &draft.proposal_date,
                    &draft.valid_until,
                    &draft.exchange_rate,
                    &draft.total_amount,
                    &draft.discount_rate,
                    &draft.delivery_time,
                    &draft.payment_terms,
                    &draft.notes,
                    &status,
                ],
            )
            .await?;
        let id: i32 = row.get(0);

        insert_items(&*tx, id, draft).await?;
        let proposal = fetch_proposal(&*tx, id)
            .await?
            .ok_or_else(|| StoreError::InvalidRecord(format!("proposal {} vanished", id)))?;

        tx.commit().await?;
        Ok(proposal)
    }

    async fn get_proposal(&self, id: i32) -> Result<Option<Proposal>, StoreError> {
        let client = self.pool.get().await?;
        fetch_proposal(&**client, id).await
    }

    async fn list_proposals(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, StoreError> {
        let client = self.pool.get().await?;

        let mut sql = format!("{} WHERE true", queries::PROPOSAL_SELECT);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(customer_id) = &filter.customer_id {
            params.push(customer_id);
            sql.push_str(&format!(" AND p.customer_id = ${}", params.len()));
        }
        if let Some(start_date) = &filter.start_date {
            params.push(start_date);
            sql.push_str(&format!(" AND p.proposal_date >= ${}", params.len()));
        }
        if let Some(end_date) = &filter.end_date {
            params.push(end_date);
            sql.push_str(&format!(" AND p.proposal_date <= ${}", params.len()));
        }
        let status = filter.status.map(ProposalStatus::as_str);
        if let Some(status) = &status {
            params.push(status);
            sql.push_str(&format!(" AND p.status = ${}", params.len()));
        }
        sql.push_str(" ORDER BY p.created_at DESC, p.id DESC");

        let rows = client.query(sql.as_str(), &params).await?;
        let mut proposals = rows
            .iter()
            .map(proposal_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        load_items(&**client, &mut proposals).await?;

        debug!("Loaded {} proposals", proposals.len());
        Ok(proposals)
    }

    async fn update_proposal(
        &self,
        id: i32,
        draft: &ProposalDraft,
    ) -> Result<Option<Proposal>, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let status = draft.status.map(ProposalStatus::as_str);
        let updated = tx
            .execute(
                queries::UPDATE_PROPOSAL,
                &[
                    &id,
                    &draft.customer_id,
                    &draft.currency_id,
                    &draft.proposal_date,
                    &draft.valid_until,
                    &draft.exchange_rate,
                    &draft.total_amount,
                    &draft.discount_rate,
                    &draft.delivery_time,
                    &draft.payment_terms,
                    &draft.notes,
                    &status,
                ],
            )
            .await?;
        if updated == 0 {
            return Ok(None);
        }

        tx.execute(queries::DELETE_PROPOSAL_ITEMS, &[&id]).await?;
        insert_items(&*tx, id, draft).await?;
        let proposal = fetch_proposal(&*tx, id).await?;

        tx.commit().await?;
        Ok(proposal)
    }

    async fn delete_proposal(&self, id: i32) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        // Items go with the proposal through ON DELETE CASCADE.
        let deleted = client.execute(queries::DELETE_PROPOSAL, &[&id]).await?;
        Ok(deleted > 0)
    }

    async fn list_currencies(&self) -> Result<Vec<Currency>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client.query(queries::LIST_CURRENCIES, &[]).await?;
        Ok(rows
            .iter()
            .map(|row| Currency {
                id: row.get("id"),
                code: row.get("code"),
                name: row.get("name"),
                symbol: row.get("symbol"),
                is_default: row.get("is_default"),
            })
            .collect())
    }

    async fn export_rows(&self) -> Result<SnapshotData, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await?;

        let statements: Vec<(Entity, String)> = Entity::ALL
            .iter()
            .map(|entity| (*entity, queries::export_table(*entity)))
            .collect();
        let tables = try_join_all(statements.iter().map(|(entity, sql)| {
            let tx = &tx;
            async move {
                let row = tx.query_one(sql.as_str(), &[]).await?;
                let value: Value = row.get(0);
                let rows = SnapshotData::rows_from_value(*entity, value)
                    .map_err(StoreError::InvalidRecord)?;
                Ok::<_, StoreError>((*entity, rows))
            }
        }))
        .await?;

        tx.commit().await?;

        let mut data = SnapshotData::new();
        for (entity, rows) in tables {
            data.insert(entity, rows);
        }
        Ok(data)
    }

    async fn apply_restore(&self, plan: &RestorePlan) -> Result<(), StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        for step in plan.steps() {
            match step {
                RestoreStep::DeleteAll(entity) => {
                    let removed = tx.execute(queries::delete_all(*entity).as_str(), &[]).await?;
                    debug!("Wiped {} rows from {}", removed, entity);
                }
                RestoreStep::InsertMany { entity, rows } => {
                    if rows.is_empty() {
                        continue;
                    }
                    let columns: Vec<String> = tx
                        .query(queries::TABLE_COLUMNS, &[&entity.table()])
                        .await?
                        .iter()
                        .map(|row| row.get(0))
                        .collect();

                    let mut inserted = 0;
                    for (present, batch) in column_batches(*entity, &columns, rows)? {
                        inserted += tx
                            .execute(queries::insert_rows(*entity, &present).as_str(), &[&Json(&batch)])
                            .await?;
                    }
                    debug!("Restored {} rows into {}", inserted, entity);
                }
            }
        }

        for entity in Entity::ALL {
            tx.query_one(queries::reset_sequence(entity).as_str(), &[]).await?;
        }

        tx.commit().await?;
        info!("Restore committed ({} steps)", plan.steps().len());
        Ok(())
    }
}
