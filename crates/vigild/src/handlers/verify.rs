use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use vigil_core::types::{PresenceOutcome, VerificationOutcome};
use vigil_core::EncodedImage;

use crate::error::ServiceError;
use crate::state::AppState;

// ── POST /verify ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub user: String,
    /// Data-URL or bare base64 image payload.
    pub image: String,
    /// Override of the configured similarity tolerance.
    pub tolerance: Option<f32>,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub detail: VerificationOutcome,
}

impl VerifyResponse {
    pub fn from_outcome(outcome: VerificationOutcome) -> Self {
        let message = match &outcome {
            VerificationOutcome::Verified { via_fallback: false, .. } => {
                "Face verification successful".to_string()
            }
            VerificationOutcome::Verified { via_fallback: true, .. } => {
                "Face verification successful (fallback comparison)".to_string()
            }
            VerificationOutcome::NotVerified { .. } => "Face verification failed".to_string(),
            VerificationOutcome::NoFaceDetected => "No face detected in the image".to_string(),
            VerificationOutcome::NoReferences => {
                "No face data found for this user".to_string()
            }
            VerificationOutcome::InputInvalid { reason } => {
                format!("Invalid image: {reason}")
            }
            VerificationOutcome::BackendUnavailable => {
                "Verification backend unavailable".to_string()
            }
        };
        Self { success: outcome.is_verified(), message, detail: outcome }
    }
}

/// Login-time and periodic re-verification. Every attempt is audited,
/// including the ones that never reach the backend.
pub async fn verify_face(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ServiceError> {
    let outcome = match EncodedImage::from_data_url(&body.image) {
        Ok(image) => {
            let references = state.store.active_references(&body.user).await?;
            let tolerance = body.tolerance.unwrap_or(state.settings.tolerance);
            state.engine.verify(references, image, tolerance).await?
        }
        Err(e) => VerificationOutcome::InputInvalid { reason: e.to_string() },
    };

    state
        .store
        .append_audit(&body.user, outcome.audit_action(), audit_details(&outcome))
        .await?;

    tracing::info!(
        user = %body.user,
        outcome = outcome.audit_action(),
        "verification attempt"
    );
    Ok(Json(VerifyResponse::from_outcome(outcome)))
}

// ── POST /detect ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DetectRequest {
    pub image: String,
}

#[derive(Serialize)]
pub struct DetectResponse {
    pub success: bool,
    pub face_present: bool,
    pub message: String,
}

/// Standalone presence check, used by the client before submitting a full
/// verification capture.
pub async fn detect_face(
    State(state): State<AppState>,
    Json(body): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, ServiceError> {
    let image = match EncodedImage::from_data_url(&body.image) {
        Ok(image) => image,
        Err(e) => {
            return Ok(Json(DetectResponse {
                success: false,
                face_present: false,
                message: format!("Invalid image: {e}"),
            }));
        }
    };

    let response = match state.engine.detect(image).await? {
        PresenceOutcome::FacePresent => DetectResponse {
            success: true,
            face_present: true,
            message: "Face detected".into(),
        },
        PresenceOutcome::NoFaceDetected => DetectResponse {
            success: true,
            face_present: false,
            message: "No face detected".into(),
        },
        PresenceOutcome::InputInvalid { reason } => DetectResponse {
            success: false,
            face_present: false,
            message: format!("Invalid image: {reason}"),
        },
    };
    Ok(Json(response))
}

/// Audit payload for one outcome. Similarities are recorded for match
/// forensics; raw image data never reaches the log.
pub fn audit_details(outcome: &VerificationOutcome) -> serde_json::Value {
    match outcome {
        VerificationOutcome::Verified { similarity, reference_id, via_fallback } => {
            serde_json::json!({
                "similarity": similarity,
                "reference_id": reference_id,
                "via_fallback": via_fallback,
            })
        }
        VerificationOutcome::NotVerified { best_similarity, via_fallback } => {
            serde_json::json!({
                "best_similarity": best_similarity,
                "via_fallback": via_fallback,
            })
        }
        VerificationOutcome::InputInvalid { reason } => serde_json::json!({ "reason": reason }),
        _ => serde_json::Value::Null,
    }
}
