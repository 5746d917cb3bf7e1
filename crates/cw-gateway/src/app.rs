//! Central shared state and router assembly: one struct holding every
//! manager, passed as `Arc<AppState>` to every handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use cw_agent::AgentOrchestrator;
use cw_broadcast::BroadcastHub;
use cw_core::CwConfig;
use cw_kanban::KanbanQueue;
use cw_notify::ChannelManager;
use cw_scheduler::SchedulerEngine;
use cw_steering::SteeringEngine;
use cw_store::Store;
use dashmap::DashMap;

pub struct AppState {
    pub config: CwConfig,
    pub store: Arc<Store>,
    pub broadcast: Arc<BroadcastHub>,
    pub kanban: Arc<KanbanQueue>,
    pub steering: Arc<SteeringEngine>,
    pub orchestrator: Arc<AgentOrchestrator>,
    pub scheduler: Arc<SchedulerEngine>,
    pub notify: Option<Arc<ChannelManager>>,
    /// Monotonic sequence stamped on every WS-forwarded broadcast event.
    event_seq: AtomicU64,
    /// Live WS connection ids, used only to report `ws_clients` on
    /// `GET /health` — the hub itself is the actual fan-out mechanism.
    pub ws_clients: DashMap<String, ()>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CwConfig,
        store: Arc<Store>,
        broadcast: Arc<BroadcastHub>,
        kanban: Arc<KanbanQueue>,
        steering: Arc<SteeringEngine>,
        orchestrator: Arc<AgentOrchestrator>,
        scheduler: Arc<SchedulerEngine>,
        notify: Option<Arc<ChannelManager>>,
    ) -> Self {
        Self {
            config,
            store,
            broadcast,
            kanban,
            steering,
            orchestrator,
            scheduler,
            notify,
            event_seq: AtomicU64::new(0),
            ws_clients: DashMap::new(),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.event_seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Assemble the full Axum router: REST surface + `/ws` upgrade, bearer-token
/// auth on everything except `/health` and `/auth/token`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/projects", post(crate::http::projects::create_project))
        .route("/projects", get(crate::http::projects::list_projects))
        .route("/projects/{id}", get(crate::http::projects::get_project))
        .route("/projects/{id}", delete(crate::http::projects::delete_project))
        .route("/projects/{id}/cards", get(crate::http::cards::list_cards))
        .route("/projects/{id}/cards", post(crate::http::cards::create_card))
        .route("/projects/{id}/cards/{cid}", put(crate::http::cards::update_card))
        .route("/projects/{id}/cards/{cid}/skip", post(crate::http::cards::skip_card))
        .route("/projects/{id}/cards/{cid}/context", post(crate::http::cards::save_context))
        .route("/agents/spawn", post(crate::http::agents::spawn_agent))
        .route("/agents", get(crate::http::agents::list_agents))
        .route("/agents/{cid}", delete(crate::http::agents::stop_agent))
        .route("/agents/{cid}/logs", get(crate::http::agents::agent_logs))
        .route("/heartbeat/submit", post(crate::http::heartbeat::submit_brief))
        .route("/search", get(crate::http::search::search))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_auth,
        ));

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/auth/token", post(crate::http::health::auth_token_stub))
        .merge(protected)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cw_core::config::{AuthConfig, AuthMode, GatewayConfig};
    use std::path::PathBuf;
    use tower::ServiceExt;

    /// Builds a fully-wired `AppState` against an in-memory store: real
    /// components, no mocks, just a throwaway backing store and workspace
    /// dir per test.
    fn test_state(auth: AuthMode) -> Arc<AppState> {
        let store = Arc::new(Store::open_in_memory(&"k".repeat(64)).unwrap());
        let broadcast = Arc::new(BroadcastHub::new());
        let kanban = Arc::new(KanbanQueue::new(store.clone(), broadcast.clone()));
        let steering = Arc::new(SteeringEngine::new(store.clone()));
        let config = CwConfig {
            gateway: GatewayConfig {
                auth: AuthConfig { mode: auth, token: Some("secret".to_string()) },
                ..CwConfig::default().gateway
            },
            ..CwConfig::default()
        };
        let workspace_path = PathBuf::from(std::env::temp_dir());
        let orchestrator = AgentOrchestrator::new(
            store.clone(),
            kanban.clone(),
            broadcast.clone(),
            steering.clone(),
            None,
            config.orchestrator.clone(),
            workspace_path.clone(),
        );
        let scheduler = Arc::new(SchedulerEngine::new(
            store.clone(),
            kanban.clone(),
            orchestrator.clone(),
            broadcast.clone(),
            config.orchestrator.clone(),
            workspace_path,
        ));
        Arc::new(AppState::new(config, store, broadcast, kanban, steering, orchestrator, scheduler, None))
    }

    fn test_app(auth: AuthMode) -> Router {
        build_router(test_state(auth))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_reachable_without_auth() {
        let app = test_app(AuthMode::Token);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_without_token_is_rejected() {
        let app = test_app(AuthMode::Token);
        let req = Request::builder().uri("/projects").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_route_with_correct_token_succeeds() {
        let app = test_app(AuthMode::Token);
        let req = Request::builder()
            .uri("/projects")
            .header("authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn auth_mode_none_bypasses_token_check() {
        let app = test_app(AuthMode::None);
        let req = Request::builder().uri("/projects").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_and_list_project_round_trips() {
        let app = test_app(AuthMode::None);
        let create_req = Request::builder()
            .method("POST")
            .uri("/projects")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"Widgets"}"#))
            .unwrap();
        let res = app.clone().oneshot(create_req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["ok"], serde_json::json!(true));
        assert_eq!(body["data"]["name"], serde_json::json!("Widgets"));

        let list_req = Request::builder().uri("/projects").body(Body::empty()).unwrap();
        let res = app.oneshot(list_req).await.unwrap();
        let body = json_body(res).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_project_rejects_blank_name() {
        let app = test_app(AuthMode::None);
        let req = Request::builder()
            .method("POST")
            .uri("/projects")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"   "}"#))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn spawn_agent_rejects_unknown_card() {
        let app = test_app(AuthMode::None);
        let req = Request::builder()
            .method("POST")
            .uri("/agents/spawn")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"card_id":"missing","project_id":"p","agent":"claude"}"#))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn search_rejects_empty_query() {
        let app = test_app(AuthMode::None);
        let req = Request::builder().uri("/search?q=").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
