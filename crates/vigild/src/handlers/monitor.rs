use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use vigil_core::types::VerificationOutcome;
use vigil_core::EncodedImage;

use crate::error::ServiceError;
use crate::handlers::verify::audit_details;
use crate::state::AppState;

// ── POST /monitor/check ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct MonitorRequest {
    pub user: String,
    pub image: String,
}

/// Continuous-monitoring result. `sleep_detected` reports absence (no face in
/// frame); `face_recognized = false` with a face present is the security case.
#[derive(Serialize)]
pub struct MonitorResponse {
    pub success: bool,
    pub face_recognized: bool,
    pub sleep_detected: bool,
    pub message: String,
}

/// Periodic check during an active session: distinguishes "user stepped
/// away" from "wrong person at the desk", and escalates repeated identity
/// mismatches to the administrators.
pub async fn monitor_check(
    State(state): State<AppState>,
    Json(body): Json<MonitorRequest>,
) -> Result<Json<MonitorResponse>, ServiceError> {
    let image = match EncodedImage::from_data_url(&body.image) {
        Ok(image) => image,
        Err(e) => {
            return Ok(Json(MonitorResponse {
                success: false,
                face_recognized: false,
                sleep_detected: false,
                message: format!("Invalid image format: {e}"),
            }));
        }
    };

    let references = state.store.active_references(&body.user).await?;
    let outcome = state
        .engine
        .verify(references, image, state.settings.tolerance)
        .await?;

    let response = match &outcome {
        VerificationOutcome::Verified { .. } => {
            state.monitor.reset(&body.user);
            state
                .store
                .append_audit(
                    &body.user,
                    "face_verification_success",
                    serde_json::json!({ "context": "continuous_monitoring" }),
                )
                .await?;
            MonitorResponse {
                success: true,
                face_recognized: true,
                sleep_detected: false,
                message: "Face recognized successfully".into(),
            }
        }
        VerificationOutcome::NoFaceDetected => {
            // Absence, not an intruder: no streak, no alert.
            state
                .store
                .append_audit(
                    &body.user,
                    "absence_detected",
                    serde_json::json!({ "context": "continuous_monitoring" }),
                )
                .await?;
            MonitorResponse {
                success: true,
                face_recognized: false,
                sleep_detected: true,
                message: "No face detected".into(),
            }
        }
        VerificationOutcome::NotVerified { .. } => {
            let streak = state.monitor.record_mismatch(&body.user);
            let alerted = streak == state.settings.alert_threshold;

            state
                .store
                .append_audit(
                    &body.user,
                    "security_alert",
                    serde_json::json!({
                        "context": "continuous_monitoring",
                        "consecutive_mismatches": streak,
                        "admins_notified": alerted,
                    }),
                )
                .await?;

            if alerted {
                tracing::warn!(
                    user = %body.user,
                    streak,
                    "repeated identity mismatch; notifying administrators"
                );
                state
                    .store
                    .insert_alert(
                        &state.settings.admin_recipients,
                        "Security Alert",
                        &format!("Unauthorized face detected for user {}", body.user),
                        "security",
                    )
                    .await?;
            }

            MonitorResponse {
                success: true,
                face_recognized: false,
                sleep_detected: false,
                message: if alerted {
                    "Face not recognized - security alert triggered".into()
                } else {
                    "Face not recognized".into()
                },
            }
        }
        VerificationOutcome::NoReferences => MonitorResponse {
            success: true,
            face_recognized: false,
            sleep_detected: false,
            message: "No face references found for user".into(),
        },
        VerificationOutcome::InputInvalid { reason } => MonitorResponse {
            success: false,
            face_recognized: false,
            sleep_detected: false,
            message: format!("Invalid image format: {reason}"),
        },
        VerificationOutcome::BackendUnavailable => {
            state
                .store
                .append_audit(&body.user, outcome.audit_action(), audit_details(&outcome))
                .await?;
            MonitorResponse {
                success: true,
                face_recognized: false,
                sleep_detected: false,
                message: "Verification backend unavailable".into(),
            }
        }
    };

    Ok(Json(response))
}
