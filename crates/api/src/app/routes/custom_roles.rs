use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use rolegate_core::RoleId;

use crate::app::catalog_mirror::MIRROR_JSON;
use crate::app::dto::{CreateRoleRequest, UpdateRoleRequest};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::AccountContext;

/// Unparseable ids cannot name a role of this account.
fn parse_role_id(raw: &str) -> Result<RoleId, ApiError> {
    raw.parse().map_err(|_| ApiError::RoleNotFound)
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))
}

/// GET /accounts/:account_id/custom_roles
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
) -> Result<Response, ApiError> {
    let summaries = services.roles.list_summaries(account.account_id()).await?;
    Ok((StatusCode::OK, Json(summaries)).into_response())
}

/// GET /accounts/:account_id/custom_roles/:id
pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path((_, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let role_id = parse_role_id(&id)?;
    let summary = services.roles.role_summary(account.account_id(), role_id).await?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}

/// POST /accounts/:account_id/custom_roles
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    body: Result<Json<CreateRoleRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(body)?;

    let role = services
        .roles
        .create_role(account.account_id(), &request.custom_role)
        .await?;
    let summary = services.roles.summarize(role).await?;

    Ok((StatusCode::CREATED, Json(summary)).into_response())
}

/// PATCH|PUT /accounts/:account_id/custom_roles/:id
pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path((_, id)): Path<(String, String)>,
    body: Result<Json<UpdateRoleRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let role_id = parse_role_id(&id)?;
    let request = json_body(body)?;
    let role = services
        .roles
        .update_role(account.account_id(), role_id, &request.custom_role)
        .await?;
    let summary = services.roles.summarize(role).await?;

    Ok((StatusCode::OK, Json(summary)).into_response())
}

/// DELETE /accounts/:account_id/custom_roles/:id
pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path((_, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let role_id = parse_role_id(&id)?;
    services.roles.delete_role(account.account_id(), role_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /accounts/:account_id/custom_roles/permissions
pub async fn permission_catalog() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        MIRROR_JSON,
    )
        .into_response()
}
