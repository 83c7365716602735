//! Proposal module
//!
//! Numbering, totals arithmetic and the create/update/delete orchestration
//! for sales proposals.

mod numbering;
mod service;
mod totals;

pub use numbering::{SequenceAllocator, DEFAULT_PREFIX};
pub use service::ProposalService;
pub use totals::{line_total, AmountOverflow, ProposalTotals};
