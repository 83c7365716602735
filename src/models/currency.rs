//! Currency model

use serde::{Deserialize, Serialize};

/// A currency usable on accounts, proposals and invoices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub id: i32,
    /// Short code, e.g. `TL`, `USD`
    pub code: String,
    pub name: String,
    pub symbol: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}
