use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::SearchError;
use crate::types::*;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/platforms", get(list_platforms))
        .route("/search", post(search_handler))
        .route("/log_search", post(log_search_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "profile-hunter",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_platforms(State(state): State<Arc<AppState>>) -> Json<Vec<PlatformInfo>> {
    Json(
        state
            .config
            .platforms
            .iter()
            .map(|p| PlatformInfo {
                name: p.name.clone(),
                domains: p.domains.clone(),
            })
            .collect(),
    )
}

/// Flat `[{platform, link, rank}]` list in the order the platforms were requested.
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<ResultLink>>, (StatusCode, Json<ErrorResponse>)> {
    info!("Processing search request: {}", request.identifier);
    let event = SearchEvent {
        username: Some("server_user".to_string()),
        ..Default::default()
    };
    match state.search(&request, event).await {
        Ok(report) => {
            info!(search_id = %report.search_id, "returning {} links", report.total_links());
            Ok(Json(report.all_links()))
        }
        Err(e) => {
            warn!("Rejected search request: {}", e);
            Err(bad_request(e))
        }
    }
}

async fn log_search_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<SearchEvent>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    if event.identifier.trim().is_empty() {
        return Err(bad_request(SearchError::InvalidIdentifier));
    }
    match state.store.append_search_event(&event).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            error!("Search log error: {}", e);
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

fn bad_request(e: SearchError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, RawResponse};
    use crate::cache::ResultCache;
    use crate::config::Config;
    use crate::error::FetchError;
    use crate::extract::ExtractionProfile;
    use crate::identity::ClientIdentity;
    use crate::orchestrator::Orchestrator;
    use crate::store::{MemoryStore, NullStore};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct StaticBackend;

    #[async_trait]
    impl Backend for StaticBackend {
        fn name(&self) -> &str {
            "static"
        }

        fn profile(&self) -> ExtractionProfile {
            ExtractionProfile::generic()
        }

        async fn fetch(
            &self,
            _query: &Query,
            _identity: &ClientIdentity,
            _timeout: Duration,
        ) -> Result<RawResponse, FetchError> {
            Ok(RawResponse {
                status: 200,
                body: r#"<a href="https://www.facebook.com/jane.doe">p</a>
                         <a href="https://twitter.com/jane.doe">t</a>"#
                    .to_string(),
            })
        }
    }

    fn state_with(store: Arc<MemoryStore>) -> Arc<AppState> {
        let cache = ResultCache::new(store.clone(), 100, true);
        let orchestrator = Orchestrator::new(vec![Arc::new(StaticBackend)], cache);
        Arc::new(AppState::new(Config::default(), orchestrator, store))
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn health() {
        let app = router(state_with(Arc::new(MemoryStore::new())));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn search_returns_flat_links_and_audits() {
        let store = Arc::new(MemoryStore::new());
        let app = router(state_with(store.clone()));

        let (status, body) = post_json(
            app,
            "/search",
            serde_json::json!({"identifier": "jane.doe", "platforms": ["twitter", "facebook"]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let links: Vec<ResultLink> = serde_json::from_slice(&body).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].platform, "Twitter");
        assert_eq!(links[0].url, "https://twitter.com/jane.doe");
        assert_eq!(links[1].platform, "Facebook");

        let events = store.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identifier, "jane.doe");
    }

    #[tokio::test]
    async fn zero_cap_returns_no_links() {
        let app = router(state_with(Arc::new(MemoryStore::new())));
        let (status, body) = post_json(
            app,
            "/search",
            serde_json::json!({"identifier": "jane.doe", "cap": 0}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let links: Vec<ResultLink> = serde_json::from_slice(&body).unwrap();
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn blank_identifier_is_bad_request() {
        let app = router(state_with(Arc::new(MemoryStore::new())));
        let (status, body) = post_json(app, "/search", serde_json::json!({"identifier": "  "})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(err.error.contains("identifier"));
    }

    #[tokio::test]
    async fn unknown_platform_is_bad_request() {
        let app = router(state_with(Arc::new(MemoryStore::new())));
        let (status, _) = post_json(
            app,
            "/search",
            serde_json::json!({"identifier": "jane", "platforms": ["Myspace"]}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn log_search_appends_event() {
        let store = Arc::new(MemoryStore::new());
        let app = router(state_with(store.clone()));
        let (status, _) = post_json(
            app,
            "/log_search",
            serde_json::json!({"identifier": "jane", "os": "Linux", "country": "NO"}),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let events = store.events().await;
        assert_eq!(events[0].os.as_deref(), Some("Linux"));
    }

    #[tokio::test]
    async fn log_search_reports_unavailable_store() {
        let cache = ResultCache::new(Arc::new(NullStore), 100, true);
        let orchestrator = Orchestrator::new(Vec::new(), cache);
        let state = Arc::new(AppState::new(Config::default(), orchestrator, Arc::new(NullStore)));
        let (status, _) = post_json(router(state), "/log_search", serde_json::json!({"identifier": "jane"})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
