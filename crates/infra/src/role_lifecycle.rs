//! Custom-role lifecycle orchestration.
//!
//! `RoleLifecycleCoordinator` is the single entry point for role mutations and
//! principal role changes:
//!
//! ```text
//! draft / patch
//!   ↓
//! 1. store opens a write transaction (account-scoped; edits lock the role)
//!   ↓
//! 2. patch merged into the locked role; RoleValidator runs against the
//!    account's current roles
//!   ↓
//! 3. insert / update; unique-key race → same error as the pre-check
//!   ↓
//! 4. commit
//! ```
//!
//! Deletion runs the [`DeletionGuard`] inside the store's transaction, and
//! principal role changes are applied to the locked assignment row.
//! Business-rule failures come back as [`LifecycleError`] variants; only
//! `Store` is unexpected.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use rolegate_auth::validation::MSG_NAME_TAKEN;
use rolegate_auth::{
    AuthzError, ConversationPermissionLevel, CustomRole, DeletionGuard, Field, PermissionCatalog,
    PermissionCategory, Principal, RoleAssignment, RoleDraft, RoleInUse, RolePatch, RoleValidator,
    SystemRole, ValidationErrors, CATALOG,
};
use rolegate_core::{AccountId, DomainError, PrincipalId, RoleId};

use crate::role_store::{RoleStore, StoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Role absent or owned by another account; both look the same.
    #[error("custom role not found")]
    NotFound,

    #[error("principal not found in account")]
    PrincipalNotFound,

    #[error(transparent)]
    RoleInUse(RoleInUse),

    /// A role change that would break a binding invariant.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Resolution(AuthzError),

    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Rejected(errors) => LifecycleError::Validation(errors),
            StoreError::DuplicateName => {
                LifecycleError::Validation(ValidationErrors::single(Field::Name, MSG_NAME_TAKEN))
            }
            StoreError::NotFound => LifecycleError::NotFound,
            StoreError::PrincipalNotFound => LifecycleError::PrincipalNotFound,
            StoreError::Refused(err) => err.into(),
            StoreError::RoleInUse(in_use) => LifecycleError::RoleInUse(in_use),
            other => LifecycleError::Store(other),
        }
    }
}

impl From<DomainError> for LifecycleError {
    fn from(value: DomainError) -> Self {
        match value {
            // A role from another account is indistinguishable from a missing one.
            DomainError::AccountMismatch(_) | DomainError::NotFound => LifecycleError::NotFound,
            DomainError::InvariantViolation(msg) | DomainError::InvalidId(msg) => LifecycleError::Conflict(msg),
        }
    }
}

impl From<AuthzError> for LifecycleError {
    fn from(value: AuthzError) -> Self {
        LifecycleError::Resolution(value)
    }
}

/// Display record for a role: the role plus its binding count and derived views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleSummary {
    #[serde(flatten)]
    pub role: CustomRole,
    pub assigned_users_count: u64,
    pub deletable: bool,
    pub permissions_by_category: BTreeMap<PermissionCategory, Vec<String>>,
    pub conversation_permission_level: ConversationPermissionLevel,
}

/// Coordinates custom-role writes and principal role changes over a [`RoleStore`].
#[derive(Debug, Clone)]
pub struct RoleLifecycleCoordinator<S> {
    store: S,
    catalog: &'static PermissionCatalog,
    guard: DeletionGuard,
}

impl<S> RoleLifecycleCoordinator<S>
where
    S: RoleStore,
{
    pub fn new(store: S) -> Self {
        Self::with_catalog(store, &CATALOG)
    }

    pub fn with_catalog(store: S, catalog: &'static PermissionCatalog) -> Self {
        Self {
            store,
            catalog,
            guard: DeletionGuard,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &'static PermissionCatalog {
        self.catalog
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn list_roles(&self, account_id: AccountId) -> Result<Vec<CustomRole>, LifecycleError> {
        Ok(self.store.list_roles(account_id).await?)
    }

    #[instrument(skip(self), fields(account_id = %account_id, role_id = %role_id))]
    pub async fn get_role(&self, account_id: AccountId, role_id: RoleId) -> Result<CustomRole, LifecycleError> {
        self.store
            .get_role(account_id, role_id)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    #[instrument(skip(self, draft), fields(account_id = %account_id))]
    pub async fn create_role(&self, account_id: AccountId, draft: &RoleDraft) -> Result<CustomRole, LifecycleError> {
        let validator = RoleValidator::new(self.catalog);
        let validate = |existing: &[CustomRole]| validator.validate(draft, account_id, existing, None);

        let role = self.store.create_role(account_id, &validate, Utc::now()).await?;
        info!(role_id = %role.id, name = %role.name, "custom role created");
        Ok(role)
    }

    /// Apply `patch` to the role as committed; fields the patch leaves out keep
    /// their stored value.
    #[instrument(skip(self, patch), fields(account_id = %account_id, role_id = %role_id))]
    pub async fn update_role(
        &self,
        account_id: AccountId,
        role_id: RoleId,
        patch: &RolePatch,
    ) -> Result<CustomRole, LifecycleError> {
        let validator = RoleValidator::new(self.catalog);
        let edit = |current: &CustomRole, existing: &[CustomRole]| {
            validator.validate(&patch.merge_into(current), account_id, existing, Some(role_id))
        };

        let role = self
            .store
            .update_role(account_id, role_id, &edit, Utc::now())
            .await?;
        info!(name = %role.name, "custom role updated");
        Ok(role)
    }

    #[instrument(skip(self), fields(account_id = %account_id, role_id = %role_id))]
    pub async fn delete_role(&self, account_id: AccountId, role_id: RoleId) -> Result<(), LifecycleError> {
        match self.store.delete_role(account_id, role_id, self.guard).await {
            Ok(role) => {
                info!(name = %role.name, "custom role deleted");
                Ok(())
            }
            Err(StoreError::RoleInUse(in_use)) => {
                info!(bound_principals = in_use.bound_principals, "custom role deletion refused");
                Err(LifecycleError::RoleInUse(in_use))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self), fields(account_id = %account_id, role_id = %role_id))]
    pub async fn role_summary(&self, account_id: AccountId, role_id: RoleId) -> Result<RoleSummary, LifecycleError> {
        let role = self.get_role(account_id, role_id).await?;
        self.summarize(role).await
    }

    /// Summaries for every role of the account, ordered by name.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn list_summaries(&self, account_id: AccountId) -> Result<Vec<RoleSummary>, LifecycleError> {
        let roles = self.store.list_roles(account_id).await?;
        let mut summaries = Vec::with_capacity(roles.len());
        for role in roles {
            summaries.push(self.summarize(role).await?);
        }
        Ok(summaries)
    }

    pub async fn summarize(&self, role: CustomRole) -> Result<RoleSummary, LifecycleError> {
        let assigned_users_count = self.store.count_bindings(role.account_id, role.id).await?;
        let permissions_by_category = role
            .permissions_by_category(self.catalog)
            .into_iter()
            .map(|(category, permissions)| {
                (
                    category,
                    permissions.into_iter().map(|p| p.as_str().to_string()).collect(),
                )
            })
            .collect();

        Ok(RoleSummary {
            assigned_users_count,
            deletable: self.guard.is_deletable(&role, assigned_users_count),
            permissions_by_category,
            conversation_permission_level: role.conversation_permission_level(),
            role,
        })
    }

    /// Add a principal to the account with a system role, or reset an existing
    /// principal to it (dropping any custom role).
    #[instrument(skip(self), fields(account_id = %account_id, principal_id = %principal_id))]
    pub async fn register_principal(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
        role: SystemRole,
    ) -> Result<RoleAssignment, LifecycleError> {
        let assignment = RoleAssignment::new(principal_id, account_id, role);
        self.store.save_assignment(assignment.clone()).await?;
        Ok(assignment)
    }

    #[instrument(skip(self), fields(account_id = %account_id, principal_id = %principal_id))]
    pub async fn get_assignment(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
    ) -> Result<RoleAssignment, LifecycleError> {
        self.store
            .get_assignment(account_id, principal_id)
            .await?
            .ok_or(LifecycleError::PrincipalNotFound)
    }

    /// Bind a custom role to an agent principal.
    #[instrument(skip(self), fields(account_id = %account_id, principal_id = %principal_id, role_id = %role_id))]
    pub async fn assign_custom_role(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
        role_id: RoleId,
    ) -> Result<RoleAssignment, LifecycleError> {
        let role = self.get_role(account_id, role_id).await?;
        let bind = |assignment: &mut RoleAssignment| assignment.bind_custom_role(&role);

        let update = self.store.update_assignment(account_id, principal_id, &bind).await?;
        info!("custom role assigned");
        Ok(update.current)
    }

    /// Drop a principal's custom role, leaving it an agent.
    #[instrument(skip(self), fields(account_id = %account_id, principal_id = %principal_id))]
    pub async fn clear_custom_role(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
    ) -> Result<RoleAssignment, LifecycleError> {
        let clear = |assignment: &mut RoleAssignment| -> Result<(), DomainError> {
            assignment.clear_custom_role();
            Ok(())
        };

        let update = self.store.update_assignment(account_id, principal_id, &clear).await?;
        if let Some(cleared) = update.previous.custom_role_id() {
            info!(cleared_role_id = %cleared, "custom role cleared");
        }
        Ok(update.current)
    }

    /// Make the principal an administrator, clearing any custom-role binding.
    #[instrument(skip(self), fields(account_id = %account_id, principal_id = %principal_id))]
    pub async fn promote_to_administrator(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
    ) -> Result<RoleAssignment, LifecycleError> {
        self.change_system_role(account_id, principal_id, SystemRole::Administrator)
            .await
    }

    #[instrument(skip(self), fields(account_id = %account_id, principal_id = %principal_id, role = %role))]
    pub async fn change_system_role(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
        role: SystemRole,
    ) -> Result<RoleAssignment, LifecycleError> {
        let change = |assignment: &mut RoleAssignment| -> Result<(), DomainError> {
            assignment.change_system_role(role);
            Ok(())
        };

        let update = self.store.update_assignment(account_id, principal_id, &change).await?;
        if let (Some(cleared), None) = (update.previous.custom_role_id(), update.current.custom_role_id()) {
            info!(cleared_role_id = %cleared, "custom role cleared by system role change");
        }
        Ok(update.current)
    }

    /// Load a principal's assignment and the role it references.
    #[instrument(skip(self), fields(account_id = %account_id, principal_id = %principal_id))]
    pub async fn resolve_principal(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
    ) -> Result<Principal, LifecycleError> {
        let assignment = self.get_assignment(account_id, principal_id).await?;
        let role = match assignment.custom_role_id() {
            Some(role_id) => self.store.get_role(account_id, role_id).await?,
            None => None,
        };
        Ok(Principal::resolve(&assignment, role)?)
    }

    /// Remove an account's roles and principals.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn remove_account(&self, account_id: AccountId) -> Result<u64, LifecycleError> {
        let removed = self.store.remove_account(account_id).await?;
        info!(removed_roles = removed, "account removed");
        Ok(removed)
    }
}
