mod handlers;
mod middleware;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub use handlers::{OpenSessionInput, SessionOpened, SubmitMessageInput};
pub use middleware::RequestLimiter;

use crate::assistant::{Assistant, SessionRegistry};
use crate::config::{AssistantConfig, SecurityConfig};
use crate::db::Database;

/// Shared state of the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub assistant: Arc<Assistant>,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(db: Database, config: AssistantConfig) -> Self {
        let sessions = SessionRegistry::new(config.session_idle_ttl);
        let assistant = Assistant::new(Arc::new(db.clone()), config);
        Self {
            db,
            assistant: Arc::new(assistant),
            sessions,
        }
    }
}

/// Router with default assistant limits and no authentication.
pub fn create_router(db: Database) -> Router {
    create_router_with(
        AppState::new(db, AssistantConfig::default()),
        SecurityConfig::disabled(),
    )
}

pub fn create_router_with(state: AppState, security: SecurityConfig) -> Router {
    let api = Router::new()
        // Projects
        .route(
            "/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        .route(
            "/projects/{id}",
            get(handlers::get_project).put(handlers::update_project),
        )
        .route(
            "/projects/{id}/tasks",
            get(handlers::list_project_tasks).post(handlers::create_task),
        )
        // Tasks
        .route("/tasks", get(handlers::list_tasks))
        .route(
            "/tasks/{id}",
            get(handlers::get_task).put(handlers::update_task),
        )
        // Assistant
        .route("/assistant/sessions", post(handlers::open_session))
        .route(
            "/assistant/sessions/{id}",
            axum::routing::delete(handlers::close_session),
        )
        .route(
            "/assistant/sessions/{id}/messages",
            get(handlers::get_transcript).post(handlers::submit_message),
        )
        // Health
        .route("/health", get(handlers::health));

    let mut app = Router::new().nest("/api/v1", api);

    if let Some(per_minute) = security.requests_per_minute {
        app = app.layer(from_fn_with_state(
            RequestLimiter::per_minute(per_minute),
            middleware::limit_requests,
        ));
    }
    if security.api_key.is_some() {
        app = app.layer(from_fn_with_state(
            security.clone(),
            middleware::require_api_key,
        ));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(cors_layer(&security))
        .with_state(state)
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    match &security.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match o.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin: {}", o);
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    }
}
