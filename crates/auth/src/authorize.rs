use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use rolegate_core::{AccountId, PrincipalId, RoleId};

use crate::catalog::PermissionCatalog;
use crate::permissions::{
    CONTACT_MANAGE, CUSTOM_ROLE_TAG, KNOWLEDGE_BASE_MANAGE, Permission, REPORT_MANAGE,
};
use crate::principal::{Principal, PrincipalRole};
use crate::roles::{ConversationPermissionLevel, SystemRole};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("account mismatch")]
    AccountMismatch,

    #[error("principal is bound to missing custom role {0}")]
    DanglingRole(RoleId),

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Resolved capability set of a principal.
///
/// Administrators are `Unrestricted`: checks must treat them as holding
/// everything instead of looking at a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "permissions", rename_all = "snake_case")]
pub enum EffectivePermissions {
    Unrestricted,
    Granted(BTreeSet<Permission>),
}

impl EffectivePermissions {
    pub fn contains(&self, permission: &str) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Granted(set) => set.iter().any(|p| p.as_str() == permission),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }

    /// Flat tag list for display (`["administrator"]` for administrators).
    pub fn to_tags(&self) -> Vec<String> {
        match self {
            Self::Unrestricted => vec![SystemRole::Administrator.as_str().to_string()],
            Self::Granted(set) => set.iter().map(|p| p.as_str().to_string()).collect(),
        }
    }
}

/// Conversation visibility a caller asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationScope {
    All,
    Unassigned,
    Participating,
}

impl ConversationPermissionLevel {
    /// Whether this level reaches `scope`. Broader levels imply narrower scopes.
    pub fn covers(self, scope: ConversationScope) -> bool {
        use ConversationPermissionLevel as L;
        use ConversationScope as S;

        match self {
            L::Administrator | L::ManageAll => true,
            L::ManageUnassigned => matches!(scope, S::Unassigned | S::Participating),
            L::ManageParticipating => matches!(scope, S::Participating),
            L::Agent | L::None => false,
        }
    }
}

/// Role type shown next to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveRole {
    Administrator,
    Agent,
    CustomRole,
}

/// Authorization decisions over resolved principals.
///
/// - No IO
/// - No panics
/// - No shared mutable state; safe to call from any number of threads
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationEngine<'c> {
    catalog: &'c PermissionCatalog,
}

impl Default for AuthorizationEngine<'static> {
    fn default() -> Self {
        Self::new(PermissionCatalog::global())
    }
}

impl<'c> AuthorizationEngine<'c> {
    pub fn new(catalog: &'c PermissionCatalog) -> Self {
        Self { catalog }
    }

    /// Administrator override, then custom role, then the system role tag.
    pub fn effective_permissions(&self, principal: &Principal) -> EffectivePermissions {
        match &principal.role {
            PrincipalRole::System(SystemRole::Administrator) => EffectivePermissions::Unrestricted,
            PrincipalRole::Custom(role) => {
                let mut set: BTreeSet<Permission> = role.permissions.iter().cloned().collect();
                set.insert(CUSTOM_ROLE_TAG);
                EffectivePermissions::Granted(set)
            }
            PrincipalRole::System(system) => {
                EffectivePermissions::Granted(BTreeSet::from([system.tag()]))
            }
        }
    }

    pub fn has_permission(&self, principal: &Principal, permission: &str) -> bool {
        principal.is_administrator() || self.effective_permissions(principal).contains(permission)
    }

    /// Authorize a principal for `required` within `account_id`.
    pub fn authorize(
        &self,
        principal: &Principal,
        account_id: AccountId,
        required: &Permission,
    ) -> Result<(), AuthzError> {
        if principal.account_id != account_id {
            return Err(AuthzError::AccountMismatch);
        }

        if self.has_permission(principal, required.as_str()) {
            Ok(())
        } else {
            tracing::debug!(
                principal_id = %principal.principal_id,
                %account_id,
                permission = %required,
                "authorization denied"
            );
            Err(AuthzError::Forbidden(required.as_str().to_string()))
        }
    }

    /// Fixed top-down ranking; the first match wins.
    pub fn conversation_permission_level(&self, principal: &Principal) -> ConversationPermissionLevel {
        match &principal.role {
            PrincipalRole::System(SystemRole::Administrator) => ConversationPermissionLevel::Administrator,
            PrincipalRole::System(SystemRole::Agent) => ConversationPermissionLevel::Agent,
            PrincipalRole::Custom(role) => role.conversation_permission_level(),
        }
    }

    pub fn can_manage_conversations(&self, principal: &Principal, scope: ConversationScope) -> bool {
        self.conversation_permission_level(principal).covers(scope)
    }

    pub fn can_manage_contacts(&self, principal: &Principal) -> bool {
        self.has_permission(principal, CONTACT_MANAGE.as_str())
    }

    pub fn can_manage_reports(&self, principal: &Principal) -> bool {
        self.has_permission(principal, REPORT_MANAGE.as_str())
    }

    pub fn can_manage_knowledge_base(&self, principal: &Principal) -> bool {
        self.has_permission(principal, KNOWLEDGE_BASE_MANAGE.as_str())
    }

    pub fn effective_role(&self, principal: &Principal) -> EffectiveRole {
        match &principal.role {
            PrincipalRole::Custom(_) => EffectiveRole::CustomRole,
            PrincipalRole::System(SystemRole::Administrator) => EffectiveRole::Administrator,
            PrincipalRole::System(SystemRole::Agent) => EffectiveRole::Agent,
        }
    }

    pub fn role_display_name(&self, principal: &Principal) -> String {
        match &principal.role {
            PrincipalRole::Custom(role) => role.name.clone(),
            PrincipalRole::System(system) => system.display_name(),
        }
    }

    /// Explain why a permission check is (or would be) granted or denied.
    pub fn explain(&self, principal: &Principal, required: &str) -> AuthorizationExplanation {
        let effective = self.effective_permissions(principal);
        let granted = self.has_permission(principal, required);

        let state = PrincipalState {
            principal_id: principal.principal_id,
            account_id: principal.account_id,
            effective_role: self.effective_role(principal),
            role_display_name: self.role_display_name(principal),
            effective_permissions: effective.to_tags(),
            unrestricted: effective.is_unrestricted(),
        };

        let known = self.catalog.contains(required);
        let reason = if principal.is_administrator() {
            "Principal is an administrator; all capabilities are granted".to_string()
        } else if granted {
            format!("Principal holds '{required}' ({})", self.catalog.describe(required))
        } else if !known {
            format!("'{required}' is not a catalog permission")
        } else {
            format!(
                "Principal does not hold '{required}'. Current permissions: {:?}",
                state.effective_permissions
            )
        };

        let suggestions = if granted {
            Vec::new()
        } else if known {
            vec![
                format!("Bind a custom role that grants '{required}'"),
                "Promote the principal to administrator".to_string(),
            ]
        } else {
            vec!["Check the permission identifier against the catalog".to_string()]
        };

        AuthorizationExplanation {
            required_permission: required.to_string(),
            granted,
            reason,
            principal: state,
            suggestions,
        }
    }
}

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub principal: PrincipalState,
    pub suggestions: Vec<String>,
}

/// State of the principal being checked.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub principal_id: PrincipalId,
    pub account_id: AccountId,
    pub effective_role: EffectiveRole,
    pub role_display_name: String,
    pub effective_permissions: Vec<String>,
    pub unrestricted: bool,
}
