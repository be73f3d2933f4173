//! Request/response bodies.

use serde::{Deserialize, Serialize};

use rolegate_auth::{
    AuthorizationExplanation, ConversationPermissionLevel, EffectiveRole, RoleBinding, RoleDraft,
    RolePatch,
};
use rolegate_core::{AccountId, PrincipalId};

/// `{"custom_role": {name, description, permissions}}`
#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub custom_role: RoleDraft,
}

/// `{"custom_role": {...}}` with any subset of the role fields.
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub custom_role: RolePatch,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: RoleBinding,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizationQuery {
    /// Explain this permission for the principal when given.
    pub permission: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PrincipalAuthorization {
    pub principal_id: PrincipalId,
    pub account_id: AccountId,
    pub effective_role: EffectiveRole,
    pub role_display_name: String,
    pub effective_permissions: Vec<String>,
    pub conversation_permission_level: ConversationPermissionLevel,
    pub can_manage_contacts: bool,
    pub can_manage_reports: bool,
    pub can_manage_knowledge_base: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<AuthorizationExplanation>,
}
