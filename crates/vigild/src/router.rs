use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers::{
    enroll::enroll_face,
    monitor::monitor_check,
    references::{list_references, remove_reference},
    status::{healthz, status},
    verify::{detect_face, verify_face},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        // Verification
        .route("/verify", post(verify_face))
        .route("/detect", post(detect_face))
        .route("/monitor/check", post(monitor_check))
        // Enrollment and reference management
        .route("/enroll", post(enroll_face))
        .route("/references/{user}", get(list_references))
        .route("/references/{user}/{id}", delete(remove_reference))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, Config};
    use crate::engine::spawn_engine;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use base64::Engine as _;
    use tower::ServiceExt;
    use vigil_core::{DisabledBackend, Verifier};
    use vigil_store::Store;

    /// Service wired against an in-memory store and the disabled backend:
    /// everything goes through the byte-similarity fallback, which makes
    /// outcomes deterministic without model files.
    async fn test_state() -> AppState {
        let store = Store::open_in_memory().await.unwrap();
        let verifier = Verifier::new(Box::new(DisabledBackend));
        let engine = spawn_engine(verifier);
        let config = Config {
            listen_port: 0,
            db_path: "unused".into(),
            model_dir: "unused".into(),
            tolerance: 0.6,
            alert_threshold: 3,
            admin_recipients: vec!["admin".into()],
            backend: BackendKind::Disabled,
        };
        AppState::new(store, engine, &config, "disabled")
    }

    fn data_url(seed: u8) -> String {
        // 300x300 textured capture: passes both the quality gate and the
        // coarse presence heuristic.
        let img = image::RgbImage::from_fn(300, 300, |x, y| {
            let v = ((x * 7 + y * 13) % 256) as u8 ^ seed;
            image::Rgb([v, v.wrapping_add(40), v.wrapping_add(80)])
        });
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        let b64 = base64::engine::general_purpose::STANDARD.encode(out.into_inner());
        format!("data:image/png;base64,{b64}")
    }

    async fn post_json(
        router: &Router,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_healthz() {
        let router = build_router(test_state().await);
        let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_verify_without_references() {
        let state = test_state().await;
        let router = build_router(state.clone());

        let (status, json) = post_json(
            &router,
            "/verify",
            serde_json::json!({ "user": "alice", "image": data_url(0) }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], false);
        assert_eq!(json["outcome"], "no_references");

        // The attempt was audited even though nothing matched.
        let audit = state.store.recent_audit("alice", 10).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "no_references");
    }

    #[tokio::test]
    async fn test_detect_presence_heuristic_with_disabled_backend() {
        let router = build_router(test_state().await);

        // Real-sized capture: the coarse heuristic presumes a face.
        let (status, json) = post_json(
            &router,
            "/detect",
            serde_json::json!({ "image": data_url(5) }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["face_present"], true);

        // Garbage payload: typed failure, not a 500.
        let (status, json) = post_json(
            &router,
            "/detect",
            serde_json::json!({ "image": "data:image/png;base64,AAAA" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], false);
        assert_eq!(json["face_present"], false);
    }

    #[tokio::test]
    async fn test_verify_invalid_payload_is_typed_not_500() {
        let router = build_router(test_state().await);
        let (status, json) = post_json(
            &router,
            "/verify",
            serde_json::json!({ "user": "alice", "image": "" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"], "input_invalid");
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_enroll_verify_and_remove_cycle() {
        let state = test_state().await;
        let router = build_router(state.clone());
        let capture = data_url(0);

        // Enroll: disabled backend stores the raw capture, explicitly tagged.
        let (status, json) = post_json(
            &router,
            "/enroll",
            serde_json::json!({ "user": "alice", "image": capture }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["kind"], "raw_image");
        let reference_id = json["reference_id"].as_str().unwrap().to_string();

        // Listed without payload contents.
        let (status, json) = get_json(&router, "/references/alice").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["kind"], "raw_image");
        assert!(json[0].get("payload").is_none());

        // Same capture verifies via the fallback path.
        let (status, json) = post_json(
            &router,
            "/verify",
            serde_json::json!({ "user": "alice", "image": capture }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["outcome"], "verified");
        assert_eq!(json["via_fallback"], true);

        // A different capture does not.
        let (_, json) = post_json(
            &router,
            "/verify",
            serde_json::json!({ "user": "alice", "image": data_url(0xAA) }),
        )
        .await;
        assert_eq!(json["success"], false);

        // Soft-delete, then the id is gone.
        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/references/alice/{reference_id}"))
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/references/alice/{reference_id}"))
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_enroll_replace_supersedes() {
        let state = test_state().await;
        let router = build_router(state.clone());

        for seed in [1u8, 2] {
            let (_, json) = post_json(
                &router,
                "/enroll",
                serde_json::json!({ "user": "bob", "image": data_url(seed) }),
            )
            .await;
            assert_eq!(json["success"], true);
        }
        assert_eq!(state.store.active_references("bob").await.unwrap().len(), 2);

        let (_, json) = post_json(
            &router,
            "/enroll",
            serde_json::json!({ "user": "bob", "image": data_url(3), "replace": true }),
        )
        .await;
        assert_eq!(json["success"], true);

        let refs = state.store.active_references("bob").await.unwrap();
        assert_eq!(refs.len(), 1);
    }

    #[tokio::test]
    async fn test_monitor_alerts_after_threshold() {
        let state = test_state().await;
        let router = build_router(state.clone());
        let enrolled = data_url(0);
        let intruder = data_url(0xFF);

        let (_, json) = post_json(
            &router,
            "/enroll",
            serde_json::json!({ "user": "carol", "image": enrolled }),
        )
        .await;
        assert_eq!(json["success"], true);

        // Two mismatches: recorded, no alert yet.
        for _ in 0..2 {
            let (_, json) = post_json(
                &router,
                "/monitor/check",
                serde_json::json!({ "user": "carol", "image": intruder }),
            )
            .await;
            assert_eq!(json["face_recognized"], false);
            assert_eq!(json["sleep_detected"], false);
            assert_eq!(json["message"], "Face not recognized");
        }
        assert!(state.store.unread_alerts("admin").await.unwrap().is_empty());

        // Third consecutive mismatch crosses the threshold.
        let (_, json) = post_json(
            &router,
            "/monitor/check",
            serde_json::json!({ "user": "carol", "image": intruder }),
        )
        .await;
        assert_eq!(json["message"], "Face not recognized - security alert triggered");

        let alerts = state.store.unread_alerts("admin").await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("carol"));

        // A fourth mismatch keeps the streak but does not re-alert.
        let (_, json) = post_json(
            &router,
            "/monitor/check",
            serde_json::json!({ "user": "carol", "image": intruder }),
        )
        .await;
        assert_eq!(json["message"], "Face not recognized");
        assert_eq!(state.store.unread_alerts("admin").await.unwrap().len(), 1);

        // Recognition resets the streak.
        let (_, json) = post_json(
            &router,
            "/monitor/check",
            serde_json::json!({ "user": "carol", "image": enrolled }),
        )
        .await;
        assert_eq!(json["face_recognized"], true);

        let (_, json) = post_json(
            &router,
            "/monitor/check",
            serde_json::json!({ "user": "carol", "image": intruder }),
        )
        .await;
        assert_eq!(json["message"], "Face not recognized");
    }

    #[tokio::test]
    async fn test_status_reports_backend_and_counts() {
        let state = test_state().await;
        let router = build_router(state.clone());

        let (_, json) = post_json(
            &router,
            "/enroll",
            serde_json::json!({ "user": "dave", "image": data_url(9) }),
        )
        .await;
        assert_eq!(json["success"], true);

        let (status, json) = get_json(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["backend"], "disabled");
        assert_eq!(json["active_references"], 1);
    }
}
