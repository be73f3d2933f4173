use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use rolegate_auth::{RoleBinding, SystemRole};
use rolegate_core::PrincipalId;

use crate::app::dto::{AuthorizationQuery, ChangeRoleRequest, PrincipalAuthorization};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::AccountContext;

/// GET /accounts/:account_id/principals/:principal_id/authorization
///
/// Effective capabilities of a member of the account; `?permission=` adds an
/// explanation of that single check.
pub async fn authorization(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path((_, principal_id)): Path<(String, String)>,
    Query(query): Query<AuthorizationQuery>,
) -> Result<Response, ApiError> {
    let principal_id: PrincipalId = principal_id
        .parse()
        .map_err(|_| ApiError::PrincipalNotFound)?;

    let principal = services
        .roles
        .resolve_principal(account.account_id(), principal_id)
        .await?;
    let engine = &services.engine;

    let body = PrincipalAuthorization {
        principal_id: principal.principal_id,
        account_id: principal.account_id,
        effective_role: engine.effective_role(&principal),
        role_display_name: engine.role_display_name(&principal),
        effective_permissions: engine.effective_permissions(&principal).to_tags(),
        conversation_permission_level: engine.conversation_permission_level(&principal),
        can_manage_contacts: engine.can_manage_contacts(&principal),
        can_manage_reports: engine.can_manage_reports(&principal),
        can_manage_knowledge_base: engine.can_manage_knowledge_base(&principal),
        explanation: query
            .permission
            .as_deref()
            .map(|permission| engine.explain(&principal, permission)),
    };

    Ok((StatusCode::OK, Json(body)).into_response())
}

/// PUT /accounts/:account_id/principals/:principal_id/role
///
/// Body `{"role": {"kind": "system", "value": "administrator"}}` or
/// `{"role": {"kind": "custom", "value": "<role id>"}}`. Administrators must
/// be demoted to `agent` before they can take a custom role.
pub async fn change_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path((_, principal_id)): Path<(String, String)>,
    body: Result<Json<ChangeRoleRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let principal_id: PrincipalId = principal_id
        .parse()
        .map_err(|_| ApiError::PrincipalNotFound)?;
    let Json(request) = body.map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;
    let account_id = account.account_id();

    let assignment = match request.role {
        RoleBinding::Custom(role_id) => {
            services
                .roles
                .assign_custom_role(account_id, principal_id, role_id)
                .await?
        }
        RoleBinding::System(SystemRole::Agent) => {
            services.roles.clear_custom_role(account_id, principal_id).await?;
            services
                .roles
                .change_system_role(account_id, principal_id, SystemRole::Agent)
                .await?
        }
        RoleBinding::System(SystemRole::Administrator) => {
            services
                .roles
                .promote_to_administrator(account_id, principal_id)
                .await?
        }
    };

    Ok((StatusCode::OK, Json(assignment)).into_response())
}
