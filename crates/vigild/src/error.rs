use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::engine::EngineError;
use vigil_store::StoreError;

/// Verification service error variants.
///
/// Expected verification failures (wrong face, no face, bad image) are NOT
/// errors — they travel as typed outcomes in 200-class responses. Only
/// infrastructure failures surface here.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("reference not found")]
    ReferenceNotFound,
    #[error("store error")]
    Store(#[from] StoreError),
    #[error("verification engine unavailable")]
    Engine(#[from] EngineError),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReferenceNotFound => "REFERENCE_NOT_FOUND",
            Self::Store(_) => "STORE",
            Self::Engine(_) => "ENGINE",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::ReferenceNotFound => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Engine(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        match &self {
            Self::Store(e) => tracing::error!(error = %e, kind = "STORE", "store failure"),
            Self::Engine(e) => tracing::error!(error = %e, kind = "ENGINE", "engine failure"),
            Self::ReferenceNotFound => {}
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::response::IntoResponse;

    async fn assert_error(
        error: ServiceError,
        expected_status: StatusCode,
        expected_kind: &str,
        expected_message: &str,
    ) {
        let resp = error.into_response();
        assert_eq!(resp.status(), expected_status);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["kind"], expected_kind);
        assert_eq!(json["message"], expected_message);
    }

    #[tokio::test]
    async fn should_return_reference_not_found() {
        assert_error(
            ServiceError::ReferenceNotFound,
            StatusCode::NOT_FOUND,
            "REFERENCE_NOT_FOUND",
            "reference not found",
        )
        .await;
    }

    #[tokio::test]
    async fn should_return_engine_unavailable() {
        assert_error(
            ServiceError::Engine(EngineError::ChannelClosed),
            StatusCode::SERVICE_UNAVAILABLE,
            "ENGINE",
            "verification engine unavailable",
        )
        .await;
    }

    #[tokio::test]
    async fn should_return_store_error() {
        assert_error(
            ServiceError::Store(StoreError::CorruptRow("bad row".into())),
            StatusCode::INTERNAL_SERVER_ERROR,
            "STORE",
            "store error",
        )
        .await;
    }
}
