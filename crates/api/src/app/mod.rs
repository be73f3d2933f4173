//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: role store selection, coordinator, authorization engine
//! - `routes/`: HTTP handlers (one file per resource)
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses
//! - `catalog_mirror.rs`: the checked-in permission catalog served to the UI

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

pub mod catalog_mirror;
pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let accounts = routes::router(services.clone()).layer(Extension(services));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(accounts)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(crate::middleware::trace_requests)))
}
