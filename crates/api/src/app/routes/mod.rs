use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};

use crate::app::services::AppServices;
use crate::middleware;

pub mod custom_roles;
pub mod principals;
pub mod system;

/// Router for all account-scoped endpoints; every route runs behind the
/// feature and administrator gates.
pub fn router(services: Arc<AppServices>) -> Router {
    Router::new()
        .route(
            "/accounts/:account_id/custom_roles",
            get(custom_roles::list_roles).post(custom_roles::create_role),
        )
        .route(
            "/accounts/:account_id/custom_roles/permissions",
            get(custom_roles::permission_catalog),
        )
        .route(
            "/accounts/:account_id/custom_roles/:id",
            get(custom_roles::get_role)
                .patch(custom_roles::update_role)
                .put(custom_roles::update_role)
                .delete(custom_roles::delete_role),
        )
        .route(
            "/accounts/:account_id/principals/:principal_id/authorization",
            get(principals::authorization),
        )
        .route(
            "/accounts/:account_id/principals/:principal_id/role",
            put(principals::change_role),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            services,
            middleware::account_gate,
        ))
}
