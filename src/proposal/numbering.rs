//! Proposal numbering
//!
//! Numbers look like `TKL-2025-007`: a fixed prefix, the calendar year and a
//! zero-padded sequence that restarts every year. The allocator only proposes
//! the next free number; the unique constraint on `proposal_number` decides.
//! Two concurrent creations can be handed the same number, and the loser gets
//! a conflict and has to retry.

use crate::store::{Store, StoreError};
use tracing::debug;

/// Default number prefix ("teklif")
pub const DEFAULT_PREFIX: &str = "TKL";

/// Minimum width of the sequence component
const SEQUENCE_WIDTH: usize = 3;

#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    prefix: String,
}

impl SequenceAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `TKL-2025-`
    pub fn year_prefix(&self, year: i32) -> String {
        format!("{}-{}-", self.prefix, year)
    }

    /// Sequence component of `number`, or 0 when the number does not have
    /// the `<year_prefix><digits>` shape
    pub fn parse_sequence(year_prefix: &str, number: &str) -> u64 {
        number
            .strip_prefix(year_prefix)
            .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|rest| rest.parse().ok())
            .unwrap_or(0)
    }

    /// Sequence numbers past 999 simply get wider
    pub fn format(year_prefix: &str, sequence: u64) -> String {
        format!("{}{:0width$}", year_prefix, sequence, width = SEQUENCE_WIDTH)
    }

    /// Next number for `year` given the numbers already taken
    pub fn next_from<'a, I>(&self, year: i32, existing: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        let year_prefix = self.year_prefix(year);
        let last = existing
            .into_iter()
            .map(|number| Self::parse_sequence(&year_prefix, number))
            .max()
            .unwrap_or(0);

        Self::format(&year_prefix, last.saturating_add(1))
    }

    /// Read the numbers taken in `year` and hand out the next one
    pub async fn next_number(&self, store: &dyn Store, year: i32) -> Result<String, StoreError> {
        let year_prefix = self.year_prefix(year);
        let existing = store.proposal_numbers_with_prefix(&year_prefix).await?;
        let next = self.next_from(year, existing.iter().map(String::as_str));

        debug!(
            "Allocated {} after {} existing numbers for {}",
            next,
            existing.len(),
            year
        );
        Ok(next)
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_number_of_year() {
        let allocator = SequenceAllocator::default();
        assert_eq!(allocator.next_from(2025, []), "TKL-2025-001");
    }

    #[test]
    fn test_uses_max_not_count() {
        let allocator = SequenceAllocator::default();
        let next = allocator.next_from(2025, ["TKL-2025-001", "TKL-2025-002", "TKL-2025-010"]);
        assert_eq!(next, "TKL-2025-011");
    }

    #[test]
    fn test_malformed_numbers_are_ignored() {
        let allocator = SequenceAllocator::default();
        let next = allocator.next_from(
            2024,
            [
                "TKL-2024-abc",
                "TKL-2024-",
                "TKL-2024-003-X",
                "TKL-2024-0x5",
                "TKL-2024--7",
                "TKL-2024-004",
            ],
        );
        assert_eq!(next, "TKL-2024-005");

        assert_eq!(allocator.next_from(2024, ["TKL-2024-abc"]), "TKL-2024-001");
    }

    #[test]
    fn test_other_years_do_not_count() {
        let allocator = SequenceAllocator::default();
        let next = allocator.next_from(2026, ["TKL-2025-041", "TKL-2025-042"]);
        assert_eq!(next, "TKL-2026-001");
    }

    #[test]
    fn test_sequence_widens_past_999() {
        let allocator = SequenceAllocator::default();
        assert_eq!(allocator.next_from(2025, ["TKL-2025-999"]), "TKL-2025-1000");
        assert_eq!(
            allocator.next_from(2025, ["TKL-2025-999", "TKL-2025-1000"]),
            "TKL-2025-1001"
        );
    }

    #[test]
    fn test_oversized_suffix_counts_as_zero() {
        assert_eq!(
            SequenceAllocator::parse_sequence("TKL-2025-", "TKL-2025-99999999999999999999999"),
            0
        );
    }

    #[test]
    fn test_custom_prefix() {
        let allocator = SequenceAllocator::new("OFR");
        assert_eq!(allocator.next_from(2025, ["OFR-2025-009"]), "OFR-2025-010");
    }
}
