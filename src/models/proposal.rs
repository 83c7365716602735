//! Proposal data models
//!
//! Sales quotations (teklif) with their line items, plus the request shapes
//! the proposal routes accept.

use crate::error::AppError;
use crate::models::Currency;
use crate::proposal::{line_total, AmountOverflow, ProposalTotals};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

/// Unit used when a line item does not name one
pub const DEFAULT_UNIT: &str = "Adet";

/// VAT percentage used when a line item does not name one
pub const DEFAULT_VAT_RATE: i32 = 20;

/// Proposal lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    #[default]
    Draft,
    Sent,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Draft => "DRAFT",
            ProposalStatus::Sent => "SENT",
            ProposalStatus::Approved => "APPROVED",
            ProposalStatus::Rejected => "REJECTED",
        }
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(ProposalStatus::Draft),
            "SENT" => Ok(ProposalStatus::Sent),
            "APPROVED" => Ok(ProposalStatus::Approved),
            "REJECTED" => Ok(ProposalStatus::Rejected),
            other => Err(format!("Unknown proposal status: {}", other)),
        }
    }
}

/// A stored proposal with its items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: i32,
    pub proposal_number: String,
    pub customer_id: i32,
    pub currency_id: i32,
    pub proposal_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub exchange_rate: Decimal,
    pub total_amount: Decimal,
    pub discount_rate: Decimal,
    pub delivery_time: Option<String>,
    pub payment_terms: Option<String>,
    pub notes: Option<String>,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub items: Vec<ProposalItem>,
}

/// The customer account a proposal is addressed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub id: i32,
    pub title: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_number: Option<String>,
    pub tax_office: Option<String>,
}

/// A proposal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalItem {
    pub id: i32,
    pub proposal_id: i32,
    pub stock_code: Option<String>,
    pub product_name: String,
    pub brand: Option<String>,
    pub quantity: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
    pub vat_rate: i32,
    pub line_total: Decimal,
    pub description: Option<String>,
}

impl Proposal {
    pub fn totals(&self) -> Result<ProposalTotals, AmountOverflow> {
        ProposalTotals::compute(
            self.items.iter().map(|item| (item.line_total, item.vat_rate)),
            self.discount_rate,
        )
    }
}

/// Validated proposal content, ready to be written by a store
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalDraft {
    pub customer_id: i32,
    pub currency_id: i32,
    pub proposal_date: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub exchange_rate: Decimal,
    pub total_amount: Decimal,
    pub discount_rate: Decimal,
    pub delivery_time: Option<String>,
    pub payment_terms: Option<String>,
    pub notes: Option<String>,
    /// `None` on update keeps the stored status
    pub status: Option<ProposalStatus>,
    pub items: Vec<ProposalItemDraft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProposalItemDraft {
    pub stock_code: Option<String>,
    pub product_name: String,
    pub brand: Option<String>,
    pub quantity: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
    pub vat_rate: i32,
    pub line_total: Decimal,
    pub description: Option<String>,
}

/// Filters for listing proposals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposalFilter {
    pub customer_id: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<ProposalStatus>,
}

impl ProposalFilter {
    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.customer_id.map_or(true, |id| proposal.customer_id == id)
            && self.start_date.map_or(true, |d| proposal.proposal_date >= d)
            && self.end_date.map_or(true, |d| proposal.proposal_date <= d)
            && self.status.map_or(true, |s| proposal.status == s)
    }
}

/// An id that clients send either as a number or as a numeric string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IdInput {
    Number(i64),
    Text(String),
}

impl IdInput {
    /// Positive `i32` ids only
    pub fn parse(&self) -> Option<i32> {
        let raw = match self {
            IdInput::Number(n) => *n,
            IdInput::Text(s) => s.trim().parse().ok()?,
        };
        i32::try_from(raw).ok().filter(|id| *id > 0)
    }
}

/// Body of `POST /api/proposals` and `PUT /api/proposals/{id}`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRequest {
    /// Explicit number; skips automatic numbering on create
    #[validate(length(min = 1, max = 50, message = "Proposal number must be between 1 and 50 characters"))]
    pub proposal_number: Option<String>,
    pub customer_id: Option<IdInput>,
    pub currency_id: Option<IdInput>,
    #[serde(default, deserialize_with = "flexible_date::option")]
    pub proposal_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "flexible_date::option")]
    pub valid_until: Option<NaiveDate>,
    pub exchange_rate: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub discount_rate: Option<Decimal>,
    #[validate(length(max = 255))]
    pub delivery_time: Option<String>,
    #[validate(length(max = 255))]
    pub payment_terms: Option<String>,
    pub notes: Option<String>,
    pub status: Option<ProposalStatus>,
    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<ProposalItemRequest>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProposalItemRequest {
    #[validate(length(max = 100))]
    pub stock_code: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "Product name is required"))]
    pub product_name: String,
    #[validate(length(max = 100))]
    pub brand: Option<String>,
    #[serde(default)]
    pub quantity: Decimal,
    #[validate(length(min = 1, max = 20))]
    pub unit: Option<String>,
    #[serde(default)]
    pub unit_price: Decimal,
    #[validate(range(min = 0, max = 100, message = "VAT rate must be between 0 and 100"))]
    pub vat_rate: Option<i32>,
    pub line_total: Option<Decimal>,
    pub description: Option<String>,
}

impl ProposalRequest {
    /// Validate and normalize the request.
    ///
    /// Returns the explicit proposal number (if any) next to the draft.
    /// `today` fills in a missing proposal date.
    pub fn into_draft(self, today: NaiveDate) -> Result<(Option<String>, ProposalDraft), AppError> {
        self.validate()?;

        let customer_id = self
            .customer_id
            .as_ref()
            .ok_or_else(|| AppError::Validation("Customer is required".to_string()))?
            .parse()
            .ok_or_else(|| AppError::Validation("Invalid customer id".to_string()))?;

        let currency_id = self
            .currency_id
            .as_ref()
            .ok_or_else(|| AppError::Validation("Currency is required".to_string()))?
            .parse()
            .ok_or_else(|| AppError::Validation("Invalid currency id".to_string()))?;

        let exchange_rate = self.exchange_rate.unwrap_or(Decimal::ONE);
        if exchange_rate <= Decimal::ZERO {
            return Err(AppError::Validation("Exchange rate must be positive".to_string()));
        }

        let discount_rate = self.discount_rate.unwrap_or(Decimal::ZERO);
        if discount_rate < Decimal::ZERO || discount_rate > Decimal::ONE_HUNDRED {
            return Err(AppError::Validation(
                "Discount rate must be between 0 and 100".to_string(),
            ));
        }

        if let (Some(valid_until), Some(proposal_date)) = (self.valid_until, self.proposal_date) {
            if valid_until < proposal_date {
                return Err(AppError::Validation(
                    "Valid-until date cannot be before the proposal date".to_string(),
                ));
            }
        }

        let items = self
            .items
            .into_iter()
            .map(ProposalItemRequest::into_draft)
            .collect::<Result<Vec<_>, _>>()?;

        let total_amount = match self.total_amount {
            Some(total) => total,
            None => {
                ProposalTotals::compute(
                    items.iter().map(|item| (item.line_total, item.vat_rate)),
                    discount_rate,
                )?
                .grand_total
            }
        };

        let draft = ProposalDraft {
            customer_id,
            currency_id,
            proposal_date: self.proposal_date.unwrap_or(today),
            valid_until: self.valid_until,
            exchange_rate,
            total_amount,
            discount_rate,
            delivery_time: self.delivery_time,
            payment_terms: self.payment_terms,
            notes: self.notes,
            status: self.status,
            items,
        };

        let explicit_number = self
            .proposal_number
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok((explicit_number, draft))
    }
}

impl ProposalItemRequest {
    fn into_draft(self) -> Result<ProposalItemDraft, AppError> {
        if self.quantity < Decimal::ZERO || self.unit_price < Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Quantity and unit price of '{}' cannot be negative",
                self.product_name
            )));
        }

        let line_total = match self.line_total {
            Some(total) => total,
            None => line_total(self.quantity, self.unit_price)?,
        };

        Ok(ProposalItemDraft {
            line_total,
            stock_code: self.stock_code,
            product_name: self.product_name,
            brand: self.brand,
            quantity: self.quantity,
            unit: self.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            unit_price: self.unit_price,
            vat_rate: self.vat_rate.unwrap_or(DEFAULT_VAT_RATE),
            description: self.description,
        })
    }
}

/// Query string of `GET /api/proposals`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalListQuery {
    /// Numeric id or `all`
    pub customer_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Status or `ALL`
    pub status: Option<String>,
}

impl ProposalListQuery {
    pub fn into_filter(self) -> Result<ProposalFilter, AppError> {
        let customer_id = match self.customer_id.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(
                IdInput::Text(raw.to_string())
                    .parse()
                    .ok_or_else(|| AppError::Validation(format!("Invalid customer id: {}", raw)))?,
            ),
        };

        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("ALL") => None,
            Some(raw) => Some(raw.parse::<ProposalStatus>().map_err(AppError::Validation)?),
        };

        let parse_date = |raw: Option<String>| -> Result<Option<NaiveDate>, AppError> {
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(s) => flexible_date::parse(s).map(Some).map_err(AppError::Validation),
            }
        };

        Ok(ProposalFilter {
            customer_id,
            start_date: parse_date(self.start_date)?,
            end_date: parse_date(self.end_date)?,
            status,
        })
    }
}

/// Dates arrive as `YYYY-MM-DD` from date inputs or as full ISO-8601
/// timestamps from scripts; an empty string means "not set".
mod flexible_date {
    use chrono::{DateTime, NaiveDate};
    use serde::{de, Deserialize, Deserializer};

    pub fn option<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse(s).map(Some).map_err(de::Error::custom),
        }
    }

    pub fn parse(s: &str) -> Result<NaiveDate, String> {
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(date);
        }
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.date_naive())
            .map_err(|_| format!("Invalid date '{}', expected YYYY-MM-DD", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn request(body: serde_json::Value) -> ProposalRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_id_input_accepts_numbers_and_strings() {
        assert_eq!(IdInput::Number(7).parse(), Some(7));
        assert_eq!(IdInput::Text(" 12 ".to_string()).parse(), Some(12));
        assert_eq!(IdInput::Text("abc".to_string()).parse(), None);
        assert_eq!(IdInput::Number(0).parse(), None);
        assert_eq!(IdInput::Number(i64::MAX).parse(), None);
    }

    #[test]
    fn test_into_draft_applies_defaults() {
        let (number, draft) = request(serde_json::json!({
            "customerId": "3",
            "currencyId": 1,
            "items": [
                { "productName": "Vida", "quantity": 10, "unitPrice": "2.50" }
            ]
        }))
        .into_draft(today())
        .unwrap();

        assert_eq!(number, None);
        assert_eq!(draft.customer_id, 3);
        assert_eq!(draft.proposal_date, today());
        assert_eq!(draft.exchange_rate, Decimal::ONE);
        assert_eq!(draft.discount_rate, Decimal::ZERO);
        assert_eq!(draft.status, None);

        let item = &draft.items[0];
        assert_eq!(item.unit, DEFAULT_UNIT);
        assert_eq!(item.vat_rate, DEFAULT_VAT_RATE);
        assert_eq!(item.line_total, dec!(25.00));
        // 25 + 20% VAT
        assert_eq!(draft.total_amount, dec!(30.00));
    }

    #[test]
    fn test_into_draft_requires_customer() {
        let err = request(serde_json::json!({ "currencyId": 1 }))
            .into_draft(today())
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = request(serde_json::json!({ "customerId": "x", "currencyId": 1 }))
            .into_draft(today())
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("customer")));
    }

    #[test]
    fn test_into_draft_keeps_explicit_number_and_dates() {
        let (number, draft) = request(serde_json::json!({
            "proposalNumber": " TKL-2024-099 ",
            "customerId": 1,
            "currencyId": 1,
            "proposalDate": "2024-12-30T21:00:00.000Z",
            "validUntil": "",
            "totalAmount": 100
        }))
        .into_draft(today())
        .unwrap();

        assert_eq!(number.as_deref(), Some("TKL-2024-099"));
        assert_eq!(draft.proposal_date, NaiveDate::from_ymd_opt(2024, 12, 30).unwrap());
        assert_eq!(draft.valid_until, None);
        assert_eq!(draft.total_amount, dec!(100));
    }

    #[test]
    fn test_into_draft_rejects_bad_item() {
        let err = request(serde_json::json!({
            "customerId": 1,
            "currencyId": 1,
            "items": [{ "productName": "", "quantity": 1, "unitPrice": 1 }]
        }))
        .into_draft(today())
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = request(serde_json::json!({
            "customerId": 1,
            "currencyId": 1,
            "items": [{ "productName": "Somun", "quantity": -1, "unitPrice": 1 }]
        }))
        .into_draft(today())
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_into_draft_rejects_amounts_out_of_range() {
        let err = request(serde_json::json!({
            "customerId": 1,
            "currencyId": 1,
            "items": [{
                "productName": "Somun",
                "quantity": "79228162514264337593543950335",
                "unitPrice": "2"
            }]
        }))
        .into_draft(today())
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = request(serde_json::json!({
            "customerId": 1,
            "currencyId": 1,
            "items": [
                { "productName": "A", "quantity": 1, "unitPrice": 1, "lineTotal": "79228162514264337593543950335" },
                { "productName": "B", "quantity": 1, "unitPrice": 1, "lineTotal": "79228162514264337593543950335" }
            ]
        }))
        .into_draft(today())
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_list_query_filters() {
        let filter = ProposalListQuery {
            customer_id: Some("all".to_string()),
            start_date: Some("2025-01-01".to_string()),
            end_date: None,
            status: Some("APPROVED".to_string()),
        }
        .into_filter()
        .unwrap();

        assert_eq!(
            filter,
            ProposalFilter {
                customer_id: None,
                start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
                end_date: None,
                status: Some(ProposalStatus::Approved),
            }
        );

        let bad = ProposalListQuery {
            status: Some("ARCHIVED".to_string()),
            ..Default::default()
        };
        assert!(bad.into_filter().is_err());
    }

    #[test]
    fn test_status_serializes_screaming() {
        assert_eq!(serde_json::to_string(&ProposalStatus::Approved).unwrap(), "\"APPROVED\"");
        assert_eq!("SENT".parse::<ProposalStatus>().unwrap(), ProposalStatus::Sent);
    }
}
