//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Notifications
        .route("/api/v1/notifications", get(handlers::list_notifications))
        .route("/api/v1/notifications/check", post(handlers::trigger_check))
        // Cache
        .route("/api/v1/cache/clear", post(handlers::clear_cache))
        // Metrics
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::FixedOffset;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::alerting::{ChatNotifier, NotificationChecker};
    use crate::store::{MemoryStore, Repository};

    struct SilentNotifier;

    #[async_trait]
    impl ChatNotifier for SilentNotifier {
        async fn notify(&self, _chat_id: i64, _text: &str) -> crate::Result<()> {
            Ok(())
        }
    }

    fn create_test_state() -> AppState {
        let repo = Arc::new(Repository::new(
            Arc::new(MemoryStore::with_default_sheets()),
            FixedOffset::east_opt(3 * 3600).unwrap(),
            3,
            Duration::from_secs(60),
        ));
        let checker = Arc::new(NotificationChecker::new(
            Arc::clone(&repo),
            Arc::new(SilentNotifier),
            Duration::from_secs(60),
        ));
        AppState {
            repo,
            checker,
            metrics: None,
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(create_test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn test_list_and_check_notifications() {
        let state = create_test_state();
        state
            .repo
            .upsert_notification(7, "acme", 100.0, None)
            .await
            .unwrap();
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/v1/notifications?chat_id=7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["notifications"][0]["account_login"], "acme");

        let response = app
            .oneshot(
                Request::post("/api/v1/notifications/check")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        // no balance row exists for the account
        assert_eq!(body["skipped"], 1);
        assert_eq!(body["alerted"], 0);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let app = create_router(create_test_state());
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let app = create_router(create_test_state());
        let response = app
            .oneshot(
                Request::post("/api/v1/cache/clear")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
