//! Entity dependency graph
//!
//! Every table that takes part in backup/restore is listed once here together
//! with its foreign keys. Restore order and wipe order are derived from this
//! table, never written out by hand.

use std::fmt;

/// A table covered by backup/restore.
///
/// Declaration order is the tie-breaker for the topological sort, so it is
/// kept close to the natural "reference data first" reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Entity {
    Currency,
    Setting,
    AuditLog,
    ExchangeRate,
    Cari,
    Proposal,
    Invoice,
    SalesSlip,
    Payment,
    CashTransaction,
    ProposalItem,
    InvoiceItem,
    SalesItem,
}

/// What happens to referencing rows when the referenced row is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Restrict,
    Cascade,
}

/// A single-column foreign key `column -> target.id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub target: Entity,
    pub on_delete: OnDelete,
}

const fn restrict(column: &'static str, target: Entity) -> ForeignKey {
    ForeignKey { column, target, on_delete: OnDelete::Restrict }
}

const fn cascade(column: &'static str, target: Entity) -> ForeignKey {
    ForeignKey { column, target, on_delete: OnDelete::Cascade }
}

impl Entity {
    pub const ALL: [Entity; 13] = [
        Entity::Currency,
        Entity::Setting,
        Entity::AuditLog,
        Entity::ExchangeRate,
        Entity::Cari,
        Entity::Proposal,
        Entity::Invoice,
        Entity::SalesSlip,
        Entity::Payment,
        Entity::CashTransaction,
        Entity::ProposalItem,
        Entity::InvoiceItem,
        Entity::SalesItem,
    ];

    /// SQL table name
    pub fn table(self) -> &'static str {
        match self {
            Entity::Currency => "currencies",
            Entity::Setting => "settings",
            Entity::AuditLog => "audit_logs",
            Entity::ExchangeRate => "exchange_rates",
            Entity::Cari => "caries",
            Entity::Proposal => "proposals",
            Entity::Invoice => "invoices",
            Entity::SalesSlip => "sales_slips",
            Entity::Payment => "payments",
            Entity::CashTransaction => "cash_transactions",
            Entity::ProposalItem => "proposal_items",
            Entity::InvoiceItem => "invoice_items",
            Entity::SalesItem => "sales_items",
        }
    }

    /// Key of this entity's list inside the snapshot `data` block
    pub fn snapshot_key(self) -> &'static str {
        match self {
            Entity::Currency => "currencies",
            Entity::Setting => "settings",
            Entity::AuditLog => "auditLogs",
            Entity::ExchangeRate => "exchangeRates",
            Entity::Cari => "caries",
            Entity::Proposal => "proposals",
            Entity::Invoice => "invoices",
            Entity::SalesSlip => "salesSlips",
            Entity::Payment => "payments",
            Entity::CashTransaction => "cashTransactions",
            Entity::ProposalItem => "proposalItems",
            Entity::InvoiceItem => "invoiceItems",
            Entity::SalesItem => "salesItems",
        }
    }

    pub fn from_snapshot_key(key: &str) -> Option<Entity> {
        Entity::ALL.into_iter().find(|e| e.snapshot_key() == key)
    }

    pub fn foreign_keys(self) -> &'static [ForeignKey] {
        const NO_REFS: &[ForeignKey] = &[];
        const EXCHANGE_RATE_REFS: &[ForeignKey] = &[restrict("currency_id", Entity::Currency)];
        const CARI_REFS: &[ForeignKey] = &[restrict("default_currency_id", Entity::Currency)];
        const PROPOSAL_REFS: &[ForeignKey] = &[
            restrict("customer_id", Entity::Cari),
            restrict("currency_id", Entity::Currency),
        ];
        const ACCOUNT_DOC_REFS: &[ForeignKey] = &[
            restrict("cari_id", Entity::Cari),
            restrict("currency_id", Entity::Currency),
        ];
        const PAYMENT_REFS: &[ForeignKey] = &[
            restrict("cari_id", Entity::Cari),
            restrict("currency_id", Entity::Currency),
            restrict("invoice_id", Entity::Invoice),
        ];
        const PROPOSAL_ITEM_REFS: &[ForeignKey] = &[cascade("proposal_id", Entity::Proposal)];
        const INVOICE_ITEM_REFS: &[ForeignKey] = &[cascade("invoice_id", Entity::Invoice)];
        const SALES_ITEM_REFS: &[ForeignKey] = &[cascade("sales_slip_id", Entity::SalesSlip)];

        match self {
            Entity::Currency | Entity::Setting | Entity::AuditLog => NO_REFS,
            Entity::ExchangeRate => EXCHANGE_RATE_REFS,
            Entity::Cari => CARI_REFS,
            Entity::Proposal => PROPOSAL_REFS,
            Entity::Invoice | Entity::SalesSlip | Entity::CashTransaction => ACCOUNT_DOC_REFS,
            Entity::Payment => PAYMENT_REFS,
            Entity::ProposalItem => PROPOSAL_ITEM_REFS,
            Entity::InvoiceItem => INVOICE_ITEM_REFS,
            Entity::SalesItem => SALES_ITEM_REFS,
        }
    }

    /// Columns carrying a unique constraint besides the primary key
    pub fn unique_columns(self) -> &'static [&'static str] {
        match self {
            Entity::Currency => &["code"],
            Entity::Proposal => &["proposal_number"],
            Entity::Invoice => &["invoice_number"],
            Entity::SalesSlip => &["slip_number"],
            _ => &[],
        }
    }

    /// Entities this one must be inserted after
    pub fn depends_on(self) -> impl Iterator<Item = Entity> {
        self.foreign_keys()
            .iter()
            .map(|fk| fk.target)
            .filter(move |target| *target != self)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// The graph table contains a dependency cycle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("entity graph has a cycle through: {0:?}")]
pub struct CycleError(pub Vec<Entity>);

/// Topological order over `entities`: every foreign-key target comes before
/// the entities referencing it. Ready entities are taken in declaration
/// order, so the result is deterministic.
pub fn topological_order(entities: &[Entity]) -> Result<Vec<Entity>, CycleError> {
    let mut remaining: Vec<Entity> = entities.to_vec();
    remaining.sort();
    remaining.dedup();

    let mut ordered = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let ready = remaining.iter().position(|candidate| {
            candidate
                .depends_on()
                .all(|dep| ordered.contains(&dep) || !entities.contains(&dep))
        });

        match ready {
            Some(idx) => ordered.push(remaining.remove(idx)),
            None => return Err(CycleError(remaining)),
        }
    }

    Ok(ordered)
}

/// Insert order for a full restore
pub fn restore_order() -> Result<Vec<Entity>, CycleError> {
    topological_order(&Entity::ALL)
}

/// Wipe order for a full restore: children before the rows they reference
pub fn delete_order() -> Result<Vec<Entity>, CycleError> {
    let mut order = restore_order()?;
    order.reverse();
    Ok(order)
}
