use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::policy::ReconcileReport;
use crate::repository::VersionToken;

#[derive(Serialize)]
pub struct SchemaStatus {
    pub sequence: u64,
    pub version: VersionToken,
    pub subscribers: usize,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub backend: &'static str,
    pub update_queue_depth: usize,
    pub schema: Option<SchemaStatus>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let schema = state.schema.latest().map(|latest| SchemaStatus {
        sequence: latest.sequence,
        version: latest.version.clone(),
        subscribers: state.schema.subscriber_count(),
    });

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        backend: state.backend,
        update_queue_depth: state.registry.queue_depth(),
        schema,
    })
}

/// Run the attachment reconciliation sweep now.
pub async fn post_reconcile(State(state): State<AppState>) -> Result<Json<ReconcileReport>, ApiError> {
    let report = state.registry.reconcile().await?;
    Ok(Json(report))
}
