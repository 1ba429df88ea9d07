use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use vigil_core::types::{EnrollOutcome, RepresentationKind};
use vigil_core::EncodedImage;

use crate::error::ServiceError;
use crate::state::AppState;

// ── POST /enroll ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct EnrollRequest {
    pub user: String,
    pub image: String,
    /// Supersede (soft-delete) the user's existing references instead of
    /// adding another one.
    #[serde(default)]
    pub replace: bool,
}

#[derive(Serialize)]
pub struct EnrollResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RepresentationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f32>,
}

impl EnrollResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            reference_id: None,
            kind: None,
            quality: None,
        }
    }
}

/// Registration-time and face-update enrollment. Stores a real embedding
/// when the backend can produce one; a degraded deployment stores the raw
/// capture, explicitly tagged, so logins still work via the fallback
/// comparator.
pub async fn enroll_face(
    State(state): State<AppState>,
    Json(body): Json<EnrollRequest>,
) -> Result<Json<EnrollResponse>, ServiceError> {
    let image = match EncodedImage::from_data_url(&body.image) {
        Ok(image) => image,
        Err(e) => {
            return Ok(Json(EnrollResponse::failure(format!("Invalid image: {e}"))));
        }
    };

    let outcome = state.engine.enroll(image).await?;

    let response = match outcome {
        EnrollOutcome::Ready { representation, model_label, quality } => {
            if body.replace {
                let superseded = state.store.deactivate_all(&body.user).await?;
                tracing::info!(user = %body.user, superseded, "superseded existing references");
            }
            let kind = representation.kind();
            let reference = state
                .store
                .insert_reference(&body.user, representation, &model_label)
                .await?;
            state
                .store
                .append_audit(
                    &body.user,
                    "face_enrolled",
                    serde_json::json!({
                        "reference_id": reference.id.clone(),
                        "kind": kind.as_str(),
                        "model_label": model_label,
                        "replaced_existing": body.replace,
                    }),
                )
                .await?;

            let message = match kind {
                RepresentationKind::Embedding => {
                    "Face registered for secure login".to_string()
                }
                RepresentationKind::RawImage => {
                    "Face image stored; full recognition unavailable, fallback comparison will be used"
                        .to_string()
                }
            };
            EnrollResponse {
                success: true,
                message,
                reference_id: Some(reference.id),
                kind: Some(kind),
                quality: Some(quality),
            }
        }
        EnrollOutcome::NoFaceDetected => EnrollResponse::failure(
            "No face detected in the image. Please capture a clear photo of your face.",
        ),
        EnrollOutcome::LowQuality { score } => {
            tracing::debug!(user = %body.user, score, "enrollment rejected for quality");
            EnrollResponse::failure(
                "Face image quality is too low. Please capture a clearer photo with good lighting.",
            )
        }
        EnrollOutcome::InputInvalid { reason } => {
            EnrollResponse::failure(format!("Invalid image: {reason}"))
        }
    };

    Ok(Json(response))
}
