//! Account-scoped persistence for custom roles and principal role assignments.
//!
//! The store owns every transactional guarantee the lifecycle relies on:
//!
//! - `create_role` / `update_role` run the caller's validation against the
//!   account's roles *inside* the write transaction. `update_role` hands the
//!   edit the locked current role, so a partial edit merges against committed
//!   state. A unique-key violation on `(account_id, name)` that slips past the
//!   check (a lost race) is reported as [`StoreError::DuplicateName`].
//! - `delete_role` counts bindings and deletes in one transaction, consulting the
//!   [`DeletionGuard`] between the two.
//! - `update_assignment` applies the caller's change to the locked assignment;
//!   binding rules are checked against that row, never a stale copy.
//! - `save_assignment` only accepts a custom-role reference to a role of the same
//!   account.
//!
//! Reads never take more than a shared lock / a plain snapshot query.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use rolegate_auth::{CustomRole, DeletionGuard, RoleAssignment, RoleInUse, ValidatedDraft, ValidationErrors};
use rolegate_core::{AccountId, DomainError, PrincipalId, RoleId};

pub use in_memory::InMemoryRoleStore;
pub use postgres::PostgresRoleStore;

/// Validation run inside a write transaction against the account's current roles.
pub type ValidateFn<'a> =
    &'a (dyn Fn(&[CustomRole]) -> Result<ValidatedDraft, ValidationErrors> + Send + Sync);

/// Edit run inside a write transaction: the locked current role, then the
/// account's roles.
pub type EditFn<'a> =
    &'a (dyn Fn(&CustomRole, &[CustomRole]) -> Result<ValidatedDraft, ValidationErrors> + Send + Sync);

/// Change applied to a principal's assignment while it is locked.
pub type AssignmentEditFn<'a> = &'a (dyn Fn(&mut RoleAssignment) -> Result<(), DomainError> + Send + Sync);

/// Result of [`RoleStore::update_assignment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentUpdate {
    pub previous: RoleAssignment,
    pub current: RoleAssignment,
}

/// Role store operation error.
///
/// `Rejected`, `DuplicateName` and `RoleInUse` are business outcomes decided
/// inside a transaction; the lifecycle coordinator turns them into typed
/// results. `Integrity` and `Backend` are unexpected failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("write rejected by validation")]
    Rejected(ValidationErrors),

    #[error("role name already taken in account")]
    DuplicateName,

    #[error("role not found")]
    NotFound,

    #[error("principal not found in account")]
    PrincipalNotFound,

    /// The assignment change broke a binding rule.
    #[error("assignment change refused: {0}")]
    Refused(DomainError),

    #[error(transparent)]
    RoleInUse(RoleInUse),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    /// All roles of an account, ordered by name.
    async fn list_roles(&self, account_id: AccountId) -> Result<Vec<CustomRole>, StoreError>;

    /// A role of `account_id`; `None` when absent or owned by another account.
    async fn get_role(&self, account_id: AccountId, role_id: RoleId) -> Result<Option<CustomRole>, StoreError>;

    /// Validate against the account's roles and insert, atomically.
    async fn create_role(
        &self,
        account_id: AccountId,
        validate: ValidateFn<'_>,
        now: DateTime<Utc>,
    ) -> Result<CustomRole, StoreError>;

    /// Lock the role, run `edit` against it and the account's roles, and apply
    /// the result, atomically.
    async fn update_role(
        &self,
        account_id: AccountId,
        role_id: RoleId,
        edit: EditFn<'_>,
        now: DateTime<Utc>,
    ) -> Result<CustomRole, StoreError>;

    /// Count bindings, consult `guard`, and delete, atomically. Returns the
    /// removed role.
    async fn delete_role(
        &self,
        account_id: AccountId,
        role_id: RoleId,
        guard: DeletionGuard,
    ) -> Result<CustomRole, StoreError>;

    /// Number of principals bound to the role.
    async fn count_bindings(&self, account_id: AccountId, role_id: RoleId) -> Result<u64, StoreError>;

    async fn get_assignment(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
    ) -> Result<Option<RoleAssignment>, StoreError>;

    /// Insert or replace a principal's assignment.
    async fn save_assignment(&self, assignment: RoleAssignment) -> Result<(), StoreError>;

    /// Lock an existing assignment, apply `edit`, and write it back, atomically.
    /// A custom role the edit binds must still exist in the account.
    async fn update_assignment(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
        edit: AssignmentEditFn<'_>,
    ) -> Result<AssignmentUpdate, StoreError>;

    /// Remove an account's roles and assignments. Returns the number of roles removed.
    async fn remove_account(&self, account_id: AccountId) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    async fn list_roles(&self, account_id: AccountId) -> Result<Vec<CustomRole>, StoreError> {
        (**self).list_roles(account_id).await
    }

    async fn get_role(&self, account_id: AccountId, role_id: RoleId) -> Result<Option<CustomRole>, StoreError> {
        (**self).get_role(account_id, role_id).await
    }

    async fn create_role(
        &self,
        account_id: AccountId,
        validate: ValidateFn<'_>,
        now: DateTime<Utc>,
    ) -> Result<CustomRole, StoreError> {
        (**self).create_role(account_id, validate, now).await
    }

    async fn update_role(
        &self,
        account_id: AccountId,
        role_id: RoleId,
        edit: EditFn<'_>,
        now: DateTime<Utc>,
    ) -> Result<CustomRole, StoreError> {
        (**self).update_role(account_id, role_id, edit, now).await
    }

    async fn delete_role(
        &self,
        account_id: AccountId,
        role_id: RoleId,
        guard: DeletionGuard,
    ) -> Result<CustomRole, StoreError> {
        (**self).delete_role(account_id, role_id, guard).await
    }

    async fn count_bindings(&self, account_id: AccountId, role_id: RoleId) -> Result<u64, StoreError> {
        (**self).count_bindings(account_id, role_id).await
    }

    async fn get_assignment(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
    ) -> Result<Option<RoleAssignment>, StoreError> {
        (**self).get_assignment(account_id, principal_id).await
    }

    async fn save_assignment(&self, assignment: RoleAssignment) -> Result<(), StoreError> {
        (**self).save_assignment(assignment).await
    }

    async fn update_assignment(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
        edit: AssignmentEditFn<'_>,
    ) -> Result<AssignmentUpdate, StoreError> {
        (**self).update_assignment(account_id, principal_id, edit).await
    }

    async fn remove_account(&self, account_id: AccountId) -> Result<u64, StoreError> {
        (**self).remove_account(account_id).await
    }
}
