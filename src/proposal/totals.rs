//! Proposal totals
//!
//! Line totals are VAT-exclusive. The proposal-level discount is applied to
//! the subtotal and, proportionally, to the VAT.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

/// A sum or product left the range `Decimal` can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("amounts are too large to total")]
pub struct AmountOverflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total_vat: Decimal,
    pub effective_vat: Decimal,
    pub grand_total: Decimal,
}

impl ProposalTotals {
    /// `lines` yields `(line_total, vat_rate_percent)` pairs
    pub fn compute<I>(lines: I, discount_rate: Decimal) -> Result<Self, AmountOverflow>
    where
        I: IntoIterator<Item = (Decimal, i32)>,
    {
        let mut subtotal = Decimal::ZERO;
        let mut total_vat = Decimal::ZERO;
        for (line_total, vat_rate) in lines {
            let vat = line_total
                .checked_mul(Decimal::from(vat_rate))
                .ok_or(AmountOverflow)?
                / Decimal::ONE_HUNDRED;
            subtotal = subtotal.checked_add(line_total).ok_or(AmountOverflow)?;
            total_vat = total_vat.checked_add(vat).ok_or(AmountOverflow)?;
        }

        let discount = discount_rate / Decimal::ONE_HUNDRED;
        let discount_amount = subtotal.checked_mul(discount).ok_or(AmountOverflow)?;
        let effective_vat = total_vat
            .checked_mul(Decimal::ONE.checked_sub(discount).ok_or(AmountOverflow)?)
            .ok_or(AmountOverflow)?;
        let grand_total = subtotal
            .checked_sub(discount_amount)
            .and_then(|net| net.checked_add(effective_vat))
            .ok_or(AmountOverflow)?;

        Ok(Self {
            subtotal: money(subtotal),
            discount_amount: money(discount_amount),
            total_vat: money(total_vat),
            effective_vat: money(effective_vat),
            grand_total: money(grand_total),
        })
    }
}

/// `quantity * unit_price`
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Result<Decimal, AmountOverflow> {
    quantity.checked_mul(unit_price).ok_or(AmountOverflow)
}

/// Two decimal places, always written out (`25.00`)
fn money(value: Decimal) -> Decimal {
    let mut value = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(2);
    value
}
