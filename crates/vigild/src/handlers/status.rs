use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ServiceError;
use crate::state::AppState;

pub async fn healthz() -> &'static str {
    "ok"
}

// ── GET /status ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub backend: String,
    pub active_references: i64,
    pub tolerance: f32,
}

pub async fn status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ServiceError> {
    let active_references = state.store.count_active_references().await?;
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        backend: state.settings.backend_label.clone(),
        active_references,
        tolerance: state.settings.tolerance,
    }))
}
