// src/lib.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod common;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use crate::config::AppState;
use crate::middleware::auth::auth_guard;

/// Monta todas as rotas. Webhooks e health ficam fora do JWT.
pub fn build_router(app_state: AppState) -> Router {
    let authorization_routes = Router::new()
        .route("/", get(handlers::authorizations::list_authorizations))
        .route("/{id}", get(handlers::authorizations::get_authorization))
        .route("/{id}/erp-sync", get(handlers::authorizations::list_sync_jobs))
        .route("/{id}/reason", post(handlers::authorizations::submit_reason))
        .route("/{id}/approve", post(handlers::authorizations::approve))
        .route("/{id}/reject", post(handlers::authorizations::reject));

    let exchange_routes = Router::new()
        .route("/", post(handlers::exchanges::create_exchange))
        .route("/mine", get(handlers::exchanges::list_my_exchanges))
        .route("/pending-hr", get(handlers::exchanges::list_pending_hr))
        .route("/{id}", get(handlers::exchanges::get_exchange))
        .route("/{id}/respond", post(handlers::exchanges::respond_exchange))
        .route("/{id}/approve", post(handlers::exchanges::approve_exchange))
        .route("/{id}/reject", post(handlers::exchanges::reject_exchange));

    let notification_routes = Router::new()
        .route("/", get(handlers::notifications::list_notifications))
        .route("/read-all", post(handlers::notifications::mark_all_read))
        .route("/{id}/read", post(handlers::notifications::mark_read))
        .route(
            "/settings",
            get(handlers::notifications::get_settings).put(handlers::notifications::update_settings),
        )
        .route(
            "/push-subscriptions",
            post(handlers::notifications::register_push).delete(handlers::notifications::remove_push),
        );

    let company_routes = Router::new()
        .route(
            "/",
            post(handlers::companies::provision_company).get(handlers::companies::list_companies),
        )
        .route("/{id}/migrate", post(handlers::companies::migrate_company))
        .route("/{id}/deactivate", post(handlers::companies::deactivate_company));

    // Tudo que exige JWT
    let protected = Router::new()
        .nest("/api/authorizations", authorization_routes)
        .nest("/api/exchanges", exchange_routes)
        .nest("/api/notifications", notification_routes)
        .nest("/api/companies", company_routes)
        .route("/api/realtime/ws", get(handlers::realtime::realtime_ws))
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), auth_guard));

    Router::new()
        .route("/api/health", get(handlers::health::liveness))
        .route("/api/health/ready", get(handlers::health::readiness))
        .route("/api/webhooks/erp/{kind}", post(handlers::webhooks::receive_erp_event))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .with_state(app_state)
}
