// routes.rs - router assembly
//
// Public routes, then groups behind `authenticate` and a role gate. Route
// layers are applied innermost first, so `authorize` is added before
// `authenticate`.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Json},
    routing::{get, patch, post},
    Router,
};
use serde_json::json;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::database::manager::health_check;
use crate::handlers::{auth, covers, hits, images, insights, me, random, topics, trending, users};
use crate::middleware::{authenticate, authorize, error_envelope, not_found, rate_limit};
use crate::state::AppState;
use crate::types::Role;

pub const API_PREFIX: &str = "/archon-api/v1";

const EDITORS: &[Role] = &[Role::Admin, Role::Editor];
const WRITERS: &[Role] = &[Role::Admin, Role::Writer];
const MEMBERS: &[Role] = &[Role::Admin, Role::Editor, Role::Writer, Role::User];

pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .nest(API_PREFIX, api_routes(&state))
        .fallback(not_found)
        .layer(cors_layer(&state.config))
        // Lift axum's own 2MB cap so the configured size applies to every extractor
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes))
        .layer(RequestBodyLimitLayer::new(state.config.api.max_request_size_bytes))
        .layer(TraceLayer::new_for_http());

    if state.config.api.enable_rate_limiting {
        router = router.layer(from_fn_with_state(state.clone(), rate_limit));
    }

    router
        .layer(from_fn_with_state(state.clone(), error_envelope))
        .with_state(state)
}

fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(public_routes())
        .merge(gated(state, member_routes(), MEMBERS))
        .merge(gated(state, editor_routes(), EDITORS))
        .merge(gated(state, writer_routes(), WRITERS))
}

/// Wrap `routes` so they require a valid access token and one of `roles`.
fn gated(state: &AppState, routes: Router<AppState>, roles: &'static [Role]) -> Router<AppState> {
    routes
        .route_layer(from_fn(authorize(roles)))
        .route_layer(from_fn_with_state(state.clone(), authenticate))
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth", post(auth::sign_in))
        .route("/auth/email", post(auth::check_email_available))
        .route("/auth/refresh", post(auth::refresh))
        .route("/topics", get(topics::list))
        .route("/insights", get(insights::list))
        .route("/insights/:idx", get(insights::get))
        .route("/insights/:idx/hits", get(hits::count).post(hits::record))
        .route("/covers", get(covers::list))
        .route("/covers/headline", get(covers::headline))
        .route("/users", get(users::list).post(users::create))
        .route("/users/:idx", get(users::get))
        .route("/trending/insights", get(trending::insights))
        .route("/trending/authors", get(trending::authors))
        .route("/random/insights", get(random::insights))
}

fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me::get))
        .route("/imgs/avatars", post(images::upload_avatar).delete(images::delete_avatar))
        .route("/users/:idx", patch(users::update).delete(users::remove))
}

fn editor_routes() -> Router<AppState> {
    Router::new()
        .route("/topics", post(topics::create).put(topics::reorder))
        .route("/topics/:idx", patch(topics::update).delete(topics::remove))
        .route("/covers", post(covers::create))
        .route("/covers/:idx", patch(covers::update).delete(covers::remove))
}

fn writer_routes() -> Router<AppState> {
    Router::new()
        .route("/insights", post(insights::create))
        .route("/insights/:idx", patch(insights::update).delete(insights::remove))
        .route("/imgs/insights", post(images::upload_insight_image))
        .route("/imgs/thumbnails", post(images::upload_thumbnail))
}

/// Credentials are allowed, so origins are listed or mirrored, never `*`.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "database": "ok"
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "timestamp": now,
                    "database": "unavailable"
                })),
            )
        }
    }
}
