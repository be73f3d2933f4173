use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rolegate_auth::{CustomRole, DeletionGuard, RoleAssignment};
use rolegate_core::{AccountId, PrincipalId, RoleId};

use super::{AssignmentEditFn, AssignmentUpdate, EditFn, RoleStore, StoreError, ValidateFn};

#[derive(Debug, Default)]
struct State {
    roles: HashMap<RoleId, CustomRole>,
    assignments: HashMap<(AccountId, PrincipalId), RoleAssignment>,
}

impl State {
    fn account_roles(&self, account_id: AccountId) -> Vec<CustomRole> {
        let mut roles: Vec<CustomRole> = self
            .roles
            .values()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        roles
    }

    fn role_in_account(&self, account_id: AccountId, role_id: RoleId) -> bool {
        self.roles.get(&role_id).is_some_and(|r| r.account_id == account_id)
    }

    fn name_taken(&self, account_id: AccountId, name: &str, except: Option<RoleId>) -> bool {
        self.roles
            .values()
            .any(|r| r.account_id == account_id && r.name == name && Some(r.id) != except)
    }

    fn bindings(&self, account_id: AccountId, role_id: RoleId) -> u64 {
        self.assignments
            .values()
            .filter(|a| a.account_id == account_id && a.custom_role_id() == Some(role_id))
            .count() as u64
    }
}

/// In-memory role store.
///
/// Intended for tests/dev. Every write runs under one write guard, which is
/// this store's transaction.
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    state: RwLock<State>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn list_roles(&self, account_id: AccountId) -> Result<Vec<CustomRole>, StoreError> {
        Ok(self.read()?.account_roles(account_id))
    }

    async fn get_role(&self, account_id: AccountId, role_id: RoleId) -> Result<Option<CustomRole>, StoreError> {
        let state = self.read()?;
        Ok(state
            .roles
            .get(&role_id)
            .filter(|r| r.account_id == account_id)
            .cloned())
    }

    async fn create_role(
        &self,
        account_id: AccountId,
        validate: ValidateFn<'_>,
        now: DateTime<Utc>,
    ) -> Result<CustomRole, StoreError> {
        let mut state = self.write()?;

        let validated = validate(&state.account_roles(account_id)).map_err(StoreError::Rejected)?;

        // unique key on (account_id, name)
        if state.name_taken(account_id, &validated.name, None) {
            return Err(StoreError::DuplicateName);
        }

        let role = CustomRole::create(account_id, validated, now);
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn update_role(
        &self,
        account_id: AccountId,
        role_id: RoleId,
        edit: EditFn<'_>,
        now: DateTime<Utc>,
    ) -> Result<CustomRole, StoreError> {
        let mut state = self.write()?;

        let mut role = state
            .roles
            .get(&role_id)
            .filter(|r| r.account_id == account_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let validated = edit(&role, &state.account_roles(account_id)).map_err(StoreError::Rejected)?;

        if state.name_taken(account_id, &validated.name, Some(role_id)) {
            return Err(StoreError::DuplicateName);
        }

        role.apply(validated, now);
        state.roles.insert(role_id, role.clone());
        Ok(role)
    }

    async fn delete_role(
        &self,
        account_id: AccountId,
        role_id: RoleId,
        guard: DeletionGuard,
    ) -> Result<CustomRole, StoreError> {
        let mut state = self.write()?;

        let role = state
            .roles
            .get(&role_id)
            .filter(|r| r.account_id == account_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let bound = state.bindings(account_id, role_id);
        guard
            .authorize_deletion(&role, bound)
            .map_err(StoreError::RoleInUse)?;

        state.roles.remove(&role_id);
        Ok(role)
    }

    async fn count_bindings(&self, account_id: AccountId, role_id: RoleId) -> Result<u64, StoreError> {
        Ok(self.read()?.bindings(account_id, role_id))
    }

    async fn get_assignment(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
    ) -> Result<Option<RoleAssignment>, StoreError> {
        Ok(self.read()?.assignments.get(&(account_id, principal_id)).cloned())
    }

    async fn save_assignment(&self, assignment: RoleAssignment) -> Result<(), StoreError> {
        let mut state = self.write()?;

        if let Some(role_id) = assignment.custom_role_id() {
            if !state.role_in_account(assignment.account_id, role_id) {
                return Err(StoreError::Integrity(format!(
                    "custom role {role_id} does not exist in account {}",
                    assignment.account_id
                )));
            }
        }
        if assignment.is_administrator() && assignment.custom_role_id().is_some() {
            return Err(StoreError::Integrity(
                "administrator cannot hold a custom role".to_string(),
            ));
        }

        state
            .assignments
            .insert((assignment.account_id, assignment.principal_id), assignment);
        Ok(())
    }

    async fn update_assignment(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
        edit: AssignmentEditFn<'_>,
    ) -> Result<AssignmentUpdate, StoreError> {
        let mut state = self.write()?;

        let previous = state
            .assignments
            .get(&(account_id, principal_id))
            .cloned()
            .ok_or(StoreError::PrincipalNotFound)?;

        let mut current = previous.clone();
        edit(&mut current).map_err(StoreError::Refused)?;

        if let Some(role_id) = current.custom_role_id() {
            if !state.role_in_account(account_id, role_id) {
                return Err(StoreError::NotFound);
            }
        }

        state.assignments.insert((account_id, principal_id), current.clone());
        Ok(AssignmentUpdate { previous, current })
    }

    async fn remove_account(&self, account_id: AccountId) -> Result<u64, StoreError> {
        let mut state = self.write()?;

        let before = state.roles.len();
        state.roles.retain(|_, r| r.account_id != account_id);
        state.assignments.retain(|(account, _), _| *account != account_id);

        Ok((before - state.roles.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use rolegate_auth::permissions::CONTACT_MANAGE;
    use rolegate_auth::{
        Field, RoleBinding, RoleDraft, RoleValidator, SystemRole, ValidatedDraft, ValidationErrors,
    };

    use super::*;

    // Skips validation so the store's own uniqueness check is exercised.
    fn fixed(name: &str) -> impl Fn(&[CustomRole]) -> Result<ValidatedDraft, ValidationErrors> + Send + Sync {
        let name = name.to_string();
        move |_existing| {
            Ok(ValidatedDraft {
                name: name.clone(),
                description: "fixed".to_string(),
                permissions: vec![CONTACT_MANAGE],
            })
        }
    }

    fn rename(name: &str) -> impl Fn(&CustomRole, &[CustomRole]) -> Result<ValidatedDraft, ValidationErrors> + Send + Sync {
        let name = name.to_string();
        move |current, _existing| {
            Ok(ValidatedDraft {
                name: name.clone(),
                description: current.description.clone(),
                permissions: current.permissions.clone(),
            })
        }
    }

    #[tokio::test]
    async fn list_is_account_scoped_and_ordered() {
        let store = InMemoryRoleStore::new();
        let account = AccountId::new();
        let other = AccountId::new();

        store.create_role(account, &fixed("Zeta"), Utc::now()).await.unwrap();
        store.create_role(account, &fixed("alpha"), Utc::now()).await.unwrap();
        store.create_role(account, &fixed("Alpha"), Utc::now()).await.unwrap();
        store.create_role(other, &fixed("Beta"), Utc::now()).await.unwrap();

        let names: Vec<String> = store
            .list_roles(account)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        // Byte order, matching the Postgres store's `COLLATE "C"`.
        assert_eq!(names, vec!["Alpha", "Zeta", "alpha"]);
    }

    #[tokio::test]
    async fn unique_key_backstops_a_permissive_check() {
        let store = InMemoryRoleStore::new();
        let account = AccountId::new();

        store.create_role(account, &fixed("Ops"), Utc::now()).await.unwrap();
        let err = store.create_role(account, &fixed("Ops"), Utc::now()).await.unwrap_err();

        assert!(matches!(err, StoreError::DuplicateName));
    }

    #[tokio::test]
    async fn validation_sees_current_roles_inside_the_write() {
        let store = InMemoryRoleStore::new();
        let account = AccountId::new();
        let validator = RoleValidator::default();

        let draft = RoleDraft::new("Ops", "ops", ["report_manage"]);
        let check = |roles: &[CustomRole]| validator.validate(&draft, account, roles, None);

        store.create_role(account, &check, Utc::now()).await.unwrap();
        let err = store.create_role(account, &check, Utc::now()).await.unwrap_err();

        let StoreError::Rejected(errors) = err else {
            panic!("expected validation rejection");
        };
        assert!(errors.has(Field::Name));
    }

    #[tokio::test]
    async fn foreign_role_is_invisible() {
        let store = InMemoryRoleStore::new();
        let role = store
            .create_role(AccountId::new(), &fixed("Ops"), Utc::now())
            .await
            .unwrap();

        let other = AccountId::new();
        assert_eq!(store.get_role(other, role.id).await.unwrap(), None);
        assert!(matches!(
            store.delete_role(other, role.id, DeletionGuard).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.update_role(other, role.id, &rename("X"), Utc::now()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_blocked_while_bound() {
        let store = InMemoryRoleStore::new();
        let account = AccountId::new();
        let role = store.create_role(account, &fixed("Ops"), Utc::now()).await.unwrap();

        for _ in 0..3 {
            let mut assignment = RoleAssignment::agent(PrincipalId::new(), account);
            assignment.bind_custom_role(&role).unwrap();
            store.save_assignment(assignment).await.unwrap();
        }

        let err = store.delete_role(account, role.id, DeletionGuard).await.unwrap_err();
        let StoreError::RoleInUse(in_use) = err else {
            panic!("expected RoleInUse");
        };
        assert_eq!(in_use.bound_principals, 3);
        assert!(store.get_role(account, role.id).await.unwrap().is_some());
        assert_eq!(store.count_bindings(account, role.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn save_assignment_enforces_same_account_reference() {
        let store = InMemoryRoleStore::new();
        let role = store
            .create_role(AccountId::new(), &fixed("Ops"), Utc::now())
            .await
            .unwrap();

        let other = AccountId::new();
        let assignment = RoleAssignment {
            principal_id: PrincipalId::new(),
            account_id: other,
            binding: RoleBinding::Custom(role.id),
        };

        assert!(matches!(
            store.save_assignment(assignment).await,
            Err(StoreError::Integrity(_))
        ));
    }

    #[tokio::test]
    async fn edit_sees_the_committed_role() {
        let store = InMemoryRoleStore::new();
        let account = AccountId::new();
        let role = store.create_role(account, &fixed("Ops"), Utc::now()).await.unwrap();

        store.update_role(account, role.id, &rename("Escalations"), Utc::now()).await.unwrap();
        let described = |current: &CustomRole, _: &[CustomRole]| -> Result<ValidatedDraft, ValidationErrors> {
            Ok(ValidatedDraft {
                name: current.name.clone(),
                description: "New text".to_string(),
                permissions: current.permissions.clone(),
            })
        };
        let updated = store.update_role(account, role.id, &described, Utc::now()).await.unwrap();

        assert_eq!(updated.name, "Escalations");
        assert_eq!(updated.description, "New text");
    }

    #[tokio::test]
    async fn assignment_edit_runs_against_the_stored_row() {
        let store = InMemoryRoleStore::new();
        let account = AccountId::new();
        let role = store.create_role(account, &fixed("Ops"), Utc::now()).await.unwrap();
        let principal = PrincipalId::new();
        store
            .save_assignment(RoleAssignment::administrator(principal, account))
            .await
            .unwrap();

        let bind = |assignment: &mut RoleAssignment| assignment.bind_custom_role(&role);
        assert!(matches!(
            store.update_assignment(account, principal, &bind).await,
            Err(StoreError::Refused(_))
        ));
        assert!(store
            .get_assignment(account, principal)
            .await
            .unwrap()
            .is_some_and(|a| a.is_administrator()));

        let demote = |assignment: &mut RoleAssignment| -> Result<(), rolegate_core::DomainError> {
            assignment.change_system_role(SystemRole::Agent);
            Ok(())
        };
        store.update_assignment(account, principal, &demote).await.unwrap();
        let update = store.update_assignment(account, principal, &bind).await.unwrap();

        assert_eq!(update.previous.binding, RoleBinding::System(SystemRole::Agent));
        assert_eq!(update.current.binding, RoleBinding::Custom(role.id));
    }

    #[tokio::test]
    async fn assignment_edit_needs_existing_principal_and_role() {
        let store = InMemoryRoleStore::new();
        let account = AccountId::new();
        let role = store.create_role(account, &fixed("Ops"), Utc::now()).await.unwrap();
        let bind = |assignment: &mut RoleAssignment| assignment.bind_custom_role(&role);

        assert!(matches!(
            store.update_assignment(account, PrincipalId::new(), &bind).await,
            Err(StoreError::PrincipalNotFound)
        ));

        let principal = PrincipalId::new();
        store.save_assignment(RoleAssignment::agent(principal, account)).await.unwrap();
        store.delete_role(account, role.id, DeletionGuard).await.unwrap();

        assert!(matches!(
            store.update_assignment(account, principal, &bind).await,
            Err(StoreError::NotFound)
        ));
        assert_eq!(
            store.get_assignment(account, principal).await.unwrap().map(|a| a.binding),
            Some(RoleBinding::System(SystemRole::Agent))
        );
    }

    #[tokio::test]
    async fn remove_account_cascades_roles() {
        let store = InMemoryRoleStore::new();
        let account = AccountId::new();
        let keep = AccountId::new();

        store.create_role(account, &fixed("A"), Utc::now()).await.unwrap();
        store.create_role(account, &fixed("B"), Utc::now()).await.unwrap();
        let kept = store.create_role(keep, &fixed("C"), Utc::now()).await.unwrap();

        assert_eq!(store.remove_account(account).await.unwrap(), 2);
        assert!(store.list_roles(account).await.unwrap().is_empty());
        assert_eq!(
            store.get_role(keep, kept.id).await.unwrap().map(|r| r.permissions),
            Some(vec![CONTACT_MANAGE])
        );
    }
}
