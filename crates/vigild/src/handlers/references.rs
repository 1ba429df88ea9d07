use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use vigil_core::types::RepresentationKind;

use crate::error::ServiceError;
use crate::state::AppState;

// ── GET /references/{user} ───────────────────────────────────────────────────

/// Reference metadata exposed to callers. Embedding vectors and raw payloads
/// stay server-side.
#[derive(Serialize)]
pub struct ReferenceSummary {
    pub id: String,
    pub kind: RepresentationKind,
    pub model_label: String,
    pub created_at: DateTime<Utc>,
}

pub async fn list_references(
    Path(user): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ReferenceSummary>>, ServiceError> {
    let references = state.store.active_references(&user).await?;
    let summaries = references
        .into_iter()
        .map(|r| ReferenceSummary {
            id: r.id,
            kind: r.representation.kind(),
            model_label: r.model_label,
            created_at: r.created_at,
        })
        .collect();
    Ok(Json(summaries))
}

// ── DELETE /references/{user}/{id} ───────────────────────────────────────────

pub async fn remove_reference(
    Path((user, id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ServiceError> {
    if !state.store.deactivate_reference(&user, &id).await? {
        return Err(ServiceError::ReferenceNotFound);
    }
    state
        .store
        .append_audit(
            &user,
            "face_reference_removed",
            serde_json::json!({ "reference_id": id }),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
