use serde::{Deserialize, Serialize};

use rolegate_core::{AccountId, DomainError, DomainResult, Entity, PrincipalId, RoleId};

use crate::authorize::AuthzError;
use crate::roles::{CustomRole, SystemRole};

/// What a principal is bound to, as stored.
///
/// Exactly one of a system role or a custom role reference. A custom-role
/// principal's base system role is always `agent`, so "administrator with a
/// custom role" has no representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RoleBinding {
    System(SystemRole),
    Custom(RoleId),
}

/// A principal's role assignment within one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub principal_id: PrincipalId,
    pub account_id: AccountId,
    pub binding: RoleBinding,
}

impl RoleAssignment {
    pub fn new(principal_id: PrincipalId, account_id: AccountId, role: SystemRole) -> Self {
        Self {
            principal_id,
            account_id,
            binding: RoleBinding::System(role),
        }
    }

    pub fn agent(principal_id: PrincipalId, account_id: AccountId) -> Self {
        Self::new(principal_id, account_id, SystemRole::Agent)
    }

    pub fn administrator(principal_id: PrincipalId, account_id: AccountId) -> Self {
        Self::new(principal_id, account_id, SystemRole::Administrator)
    }

    pub fn system_role(&self) -> SystemRole {
        match self.binding {
            RoleBinding::System(role) => role,
            RoleBinding::Custom(_) => SystemRole::Agent,
        }
    }

    pub fn is_administrator(&self) -> bool {
        self.system_role() == SystemRole::Administrator
    }

    pub fn custom_role_id(&self) -> Option<RoleId> {
        match self.binding {
            RoleBinding::Custom(id) => Some(id),
            RoleBinding::System(_) => None,
        }
    }

    /// Bind a custom role in place of the system role.
    ///
    /// Rejects a role from another account and an administrator principal.
    pub fn bind_custom_role(&mut self, role: &CustomRole) -> DomainResult<()> {
        if !role.belongs_to(self.account_id) {
            return Err(DomainError::account_mismatch(format!(
                "custom role {} does not belong to account {}",
                role.id, self.account_id
            )));
        }
        if self.is_administrator() {
            return Err(DomainError::invariant(
                "cannot have both administrator role and custom role",
            ));
        }
        self.binding = RoleBinding::Custom(role.id);
        Ok(())
    }

    /// Drop any custom role, falling back to `agent`.
    pub fn clear_custom_role(&mut self) -> Option<RoleId> {
        let cleared = self.custom_role_id();
        if cleared.is_some() {
            self.binding = RoleBinding::System(SystemRole::Agent);
        }
        cleared
    }

    /// Make the principal an administrator. Any custom-role binding is
    /// cleared; the cleared role id is returned.
    pub fn promote_to_administrator(&mut self) -> Option<RoleId> {
        let cleared = self.custom_role_id();
        self.binding = RoleBinding::System(SystemRole::Administrator);
        cleared
    }

    /// Change the base system role.
    ///
    /// Moving to `administrator` clears a custom role. Moving to `agent` never
    /// touches an existing custom-role binding.
    pub fn change_system_role(&mut self, role: SystemRole) -> Option<RoleId> {
        match role {
            SystemRole::Administrator => self.promote_to_administrator(),
            SystemRole::Agent => {
                if self.is_administrator() {
                    self.binding = RoleBinding::System(SystemRole::Agent);
                }
                None
            }
        }
    }
}

impl Entity for RoleAssignment {
    type Id = PrincipalId;

    fn id(&self) -> &Self::Id {
        &self.principal_id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }
}

/// A principal's role, resolved for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalRole {
    System(SystemRole),
    Custom(CustomRole),
}

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is decoupled from storage and transport: the
/// caller loads the assignment (and the bound role, if any) and resolves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub account_id: AccountId,
    pub role: PrincipalRole,
}

impl Principal {
    pub fn system(principal_id: PrincipalId, account_id: AccountId, role: SystemRole) -> Self {
        Self {
            principal_id,
            account_id,
            role: PrincipalRole::System(role),
        }
    }

    /// Resolve an assignment against the role it references.
    ///
    /// `role` is ignored for system bindings. For custom bindings it must be
    /// the referenced role and must live in the principal's account.
    pub fn resolve(assignment: &RoleAssignment, role: Option<CustomRole>) -> Result<Self, AuthzError> {
        let resolved = match (assignment.binding, role) {
            (RoleBinding::System(system), _) => PrincipalRole::System(system),
            (RoleBinding::Custom(role_id), Some(role)) if role.id == role_id => {
                if !role.belongs_to(assignment.account_id) {
                    return Err(AuthzError::AccountMismatch);
                }
                PrincipalRole::Custom(role)
            }
            (RoleBinding::Custom(role_id), _) => return Err(AuthzError::DanglingRole(role_id)),
        };

        Ok(Self {
            principal_id: assignment.principal_id,
            account_id: assignment.account_id,
            role: resolved,
        })
    }

    pub fn is_administrator(&self) -> bool {
        matches!(self.role, PrincipalRole::System(SystemRole::Administrator))
    }

    pub fn custom_role(&self) -> Option<&CustomRole> {
        match &self.role {
            PrincipalRole::Custom(role) => Some(role),
            PrincipalRole::System(_) => None,
        }
    }

    pub fn system_role(&self) -> SystemRole {
        match &self.role {
            PrincipalRole::System(role) => *role,
            PrincipalRole::Custom(_) => SystemRole::Agent,
        }
    }
}
