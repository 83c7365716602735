//! Backup route handlers
//!
//! `GET /api/backup/export` downloads the whole database as one JSON
//! document; `POST /api/backup/import` replaces the database with one.

use crate::backup::{RestoreRequest, Snapshot};
use crate::error::ApiResult;
use crate::state::SharedState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub message: String,
    /// Rows inserted per snapshot key
    pub restored: BTreeMap<&'static str, usize>,
}

/// `attachment; filename="backup-2025-03-14.json"`
pub fn content_disposition(snapshot: &Snapshot) -> String {
    format!(
        "attachment; filename=\"backup-{}.json\"",
        snapshot.metadata.timestamp.format("%Y-%m-%d")
    )
}

pub async fn export_backup(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    let snapshot = state.backups.export().await?;
    let disposition = content_disposition(&snapshot);

    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(snapshot)))
}

pub async fn import_backup(
    State(state): State<SharedState>,
    payload: Result<Json<RestoreRequest>, JsonRejection>,
) -> ApiResult<Json<ImportResponse>> {
    let Json(request) = payload?;
    let summary = state.backups.restore(request).await?;

    let total: usize = summary.restored.values().sum();
    info!("Import finished, {} rows restored", total);

    Ok(Json(ImportResponse {
        success: true,
        message: "Backup restored successfully".to_string(),
        restored: summary.restored,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{SnapshotData, SnapshotMetadata};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_content_disposition_uses_snapshot_date() {
        let snapshot = Snapshot {
            metadata: SnapshotMetadata {
                timestamp: Utc.with_ymd_and_hms(2025, 3, 14, 23, 59, 0).unwrap(),
                version: "1.0".to_string(),
            },
            data: SnapshotData::new(),
        };
        assert_eq!(
            content_disposition(&snapshot),
            "attachment; filename=\"backup-2025-03-14.json\""
        );
    }
}
