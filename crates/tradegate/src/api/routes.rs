//! API route definitions.

use axum::http::{HeaderValue, Method, header};
use axum::{
    Extension, Router, middleware,
    routing::{MethodRouter, get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::gate::gate_middleware;

use super::error::X_ERROR;
use super::handlers;
use super::proxy::{self, ResourceRoute};
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    // Tracing layer with request IDs and timing
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let gate = state.gate.clone();

    let mut router = Router::new()
        .route("/api/health", get(handlers::health))
        // Auth relay
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/session", get(handlers::session))
        // Development support
        .route("/api/test/token", post(handlers::mint_test_token));

    // Collection and item routes per resource, all served by the same handler.
    // `{*rest}` never matches an empty tail, so the trailing slash gets its own route.
    for name in state.resources.iter() {
        let route = ResourceRoute::new(name);
        router = router
            .route(&format!("/api/{name}"), resource_methods(route.clone()))
            .route(&format!("/api/{name}/"), resource_methods(route.clone()))
            .route(&format!("/api/{name}/{{*rest}}"), resource_methods(route));
    }

    // The gate wraps the fallbacks too, so unknown paths are classified first.
    router
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(gate, gate_middleware))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

fn resource_methods(route: ResourceRoute) -> MethodRouter<AppState> {
    get(proxy::proxy_resource)
        .post(proxy::proxy_resource)
        .put(proxy::proxy_resource)
        .patch(proxy::proxy_resource)
        .delete(proxy::proxy_resource)
        .layer(Extension(route))
}

/// Build the CORS layer based on configuration.
///
/// With no configured origins any origin is allowed, without credentials.
/// Configured origins are matched exactly and may send cookies.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::PATCH,
        Method::OPTIONS,
    ];

    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::ORIGIN,
        header::COOKIE,
    ];

    if state.allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers)
            .expose_headers([X_ERROR.clone()]);
    }

    let origins: Vec<HeaderValue> = state
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("CORS: Invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    if origins.is_empty() {
        tracing::error!("CORS: All configured origins are invalid!");
        return CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")));
    }

    tracing::info!("CORS: Allowing {} origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers([X_ERROR.clone()])
        .allow_credentials(true)
}
