// app.rs - Shared request state and the HTTP router
//
// Routes are grouped by security tier the same way the handlers are laid out:
// public (no session), protected (session required) and elevated (session
// plus the privileged operator allow list, checked inside the handlers).

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, patch, post, put},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::database::{DatabaseManager, Store};
use crate::handlers::{elevated, protected, public};
use crate::integrations::IonCatalog;
use crate::middleware::session_middleware;
use crate::services::ActivityDispatcher;

/// Everything a handler needs, cloned per request
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub activity: ActivityDispatcher,
    pub ion: Arc<dyn IonCatalog>,
}

impl AppState {
    /// Starts the activity writer; must run inside a tokio runtime
    pub fn new(store: Arc<dyn Store>, config: AppConfig, ion: Arc<dyn IonCatalog>) -> Self {
        let activity = ActivityDispatcher::spawn(store.clone(), config.activity.queue_capacity);
        Self {
            store,
            config: Arc::new(config),
            activity,
            ion,
        }
    }

    pub fn is_operator(&self, email: &str) -> bool {
        self.config.security.privileged_operators.contains(email)
    }
}

pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(session_routes())
        .merge(organization_routes())
        .merge(project_routes())
        .merge(asset_routes())
        .merge(integration_routes())
        .merge(operator_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), session_middleware));

    let router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(public_routes())
        // Session required
        .merge(protected)
        // Global middleware
        .layer(
            ServiceBuilder::new()
                .layer(cors_layer(&state.config))
                .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes)),
        );

    let router = if state.config.api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    router.with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

fn public_routes() -> Router<AppState> {
    use public::{auth, plans};

    Router::new()
        .route("/auth/signup", post(auth::signup_post))
        .route("/auth/login", post(auth::login_post))
        .route("/auth/logout", post(auth::logout_post))
        .route("/api/plans", get(plans::plans_get))
}

fn session_routes() -> Router<AppState> {
    use protected::{auth, invites};

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami_get))
        .route("/api/invites/accept", post(invites::accept_post))
}

fn organization_routes() -> Router<AppState> {
    use protected::{activity, invites, members, organizations};

    Router::new()
        .route("/api/organizations", post(organizations::create_post))
        .route("/api/organizations/list", get(organizations::list_get))
        .route(
            "/api/organizations/:org_id",
            get(organizations::show_get)
                .patch(organizations::rename_patch)
                .delete(organizations::remove_delete),
        )
        .route("/api/organizations/:org_id/usage", get(organizations::usage_get))
        .route("/api/organizations/:org_id/members", get(members::list_get))
        .route(
            "/api/organizations/:org_id/members/:user_id",
            patch(members::role_patch).delete(members::remove_delete),
        )
        .route(
            "/api/organizations/:org_id/invites",
            get(invites::list_get).post(invites::create_post),
        )
        .route(
            "/api/organizations/:org_id/invites/:invite_id",
            axum::routing::delete(invites::revoke_delete),
        )
        .route("/api/organizations/:org_id/activity", get(activity::list_get))
}

fn project_routes() -> Router<AppState> {
    use protected::projects;

    Router::new()
        .route("/api/projects", get(projects::list_get).post(projects::create_post))
        .route(
            "/api/projects/:project_id",
            get(projects::show_get)
                .put(projects::replace_put)
                .patch(projects::update_patch)
                .delete(projects::remove_delete),
        )
        .route("/api/projects/:project_id/publish", post(projects::publish_post))
        .route("/api/projects/:project_id/unpublish", post(projects::unpublish_post))
}

fn asset_routes() -> Router<AppState> {
    use protected::assets;

    Router::new()
        .route(
            "/api/organizations/:org_id/assets",
            get(assets::list_get).post(assets::register_post),
        )
        .route(
            "/api/assets/:asset_id",
            get(assets::show_get).delete(assets::remove_delete),
        )
        .route("/api/models/:asset_id/transform", put(assets::transform_put))
}

fn integration_routes() -> Router<AppState> {
    use protected::integrations;

    Router::new()
        .route(
            "/api/organizations/:org_id/cesium-integrations",
            get(integrations::list_get).post(integrations::create_post),
        )
        .route(
            "/api/organizations/:org_id/cesium-integrations/:integration_id",
            axum::routing::delete(integrations::remove_delete),
        )
        .route(
            "/api/organizations/:org_id/cesium-integrations/:integration_id/sync",
            post(integrations::sync_post),
        )
}

fn operator_routes() -> Router<AppState> {
    use elevated::operator;

    Router::new().route(
        "/api/organizations/:org_id/license",
        patch(operator::license_patch),
    )
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "SceneHub API",
            "version": version,
            "description": "Organizations, projects and scene persistence for the SceneHub apps",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "plans": "/api/plans (public)",
                "public_auth": "/auth/signup, /auth/login, /auth/logout (public)",
                "auth": "/api/auth/whoami (session)",
                "organizations": "/api/organizations[/:orgId[/members|invites|usage|activity|assets]] (session + membership)",
                "invites": "/api/invites/accept (session)",
                "projects": "/api/projects[/:projectId[/publish|unpublish]] (session + membership)",
                "assets": "/api/assets/:assetId, /api/models/:assetId/transform (session + membership)",
                "integrations": "/api/organizations/:orgId/cesium-integrations[/:id[/sync]] (admin)",
                "operator": "/api/organizations/:orgId/license (privileged operators)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check(state.store.as_ref()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database_error": e.to_string()
                    }
                })),
            )
        }
    }
}
