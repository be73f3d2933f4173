//! Postgres-backed role store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `DuplicateName` | Concurrent create/rename won the `(account_id, name)` key |
//! | Database (foreign key violation) | `23503` | `Integrity` | Assignment references a role outside its account, or a role deleted concurrently |
//! | Database (check constraint violation) | `23514` | `Integrity` | Column bounds, or administrator with a custom role |
//! | Database (other) | Any other | `Backend` | |
//! | Other | N/A | `Backend` | Pool closed, network errors, etc. |
//!
//! ## Transactions
//!
//! Writes use one `sqlx::Transaction` each. `update_role` and `delete_role`
//! lock the role row with `FOR UPDATE`; the edit sees that row, and deletion
//! counts bindings under the lock. An assignment write that references the
//! role needs a key-share lock on the same row, so it waits for the delete and
//! then finds the role gone instead of binding a role that no longer exists.
//! `update_assignment` locks the principal's row before handing it to the edit.
//!
//! Roles list by `name COLLATE "C"` (byte order), the same order the in-memory
//! store uses, independent of the database's default collation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};
use uuid::Uuid;

use rolegate_auth::{CustomRole, DeletionGuard, Permission, RoleAssignment, RoleBinding, SystemRole};
use rolegate_core::{AccountId, PrincipalId, RoleId};

use super::{AssignmentEditFn, AssignmentUpdate, EditFn, RoleStore, StoreError, ValidateFn};

const SCHEMA_SQL: &str = include_str!("../../migrations/0001_custom_roles.sql");

const ROLE_COLUMNS: &str =
    "id, account_id, name, description, permissions, is_system, parent_id, created_at, updated_at";

const ROLE_ORDER: &str = r#"name COLLATE "C" ASC, id ASC"#;

const ASSIGNMENT_COLUMNS: &str = "account_id, principal_id, system_role, custom_role_id";

#[derive(Debug, Clone)]
pub struct PostgresRoleStore {
    pool: Arc<PgPool>,
}

impl PostgresRoleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect and build a store. Does not run the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if missing.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn account_roles_tx(
    tx: &mut Transaction<'static, Postgres>,
    account_id: AccountId,
) -> Result<Vec<CustomRole>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {ROLE_COLUMNS} FROM custom_roles WHERE account_id = $1 ORDER BY {ROLE_ORDER}"
    ))
    .bind(account_id.as_uuid())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_account_roles", e))?;

    rows.iter().map(role_from_row).collect()
}

async fn rollback(tx: Transaction<'static, Postgres>) -> Result<(), StoreError> {
    tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
}

async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), StoreError> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

#[async_trait]
impl RoleStore for PostgresRoleStore {
    #[instrument(skip(self), fields(account_id = %account_id, role_count = tracing::field::Empty), err)]
    async fn list_roles(&self, account_id: AccountId) -> Result<Vec<CustomRole>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ROLE_COLUMNS} FROM custom_roles WHERE account_id = $1 ORDER BY {ROLE_ORDER}"
        ))
        .bind(account_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_roles", e))?;

        let roles = rows.iter().map(role_from_row).collect::<Result<Vec<_>, _>>()?;
        Span::current().record("role_count", roles.len());
        Ok(roles)
    }

    #[instrument(skip(self), fields(account_id = %account_id, role_id = %role_id), err)]
    async fn get_role(&self, account_id: AccountId, role_id: RoleId) -> Result<Option<CustomRole>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ROLE_COLUMNS} FROM custom_roles WHERE account_id = $1 AND id = $2"
        ))
        .bind(account_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_role", e))?;

        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self, validate), fields(account_id = %account_id, role_id = tracing::field::Empty), err)]
    async fn create_role(
        &self,
        account_id: AccountId,
        validate: ValidateFn<'_>,
        now: DateTime<Utc>,
    ) -> Result<CustomRole, StoreError> {
        let mut tx = self.begin().await?;

        let existing = account_roles_tx(&mut tx, account_id).await?;
        let validated = match validate(&existing) {
            Ok(validated) => validated,
            Err(errors) => {
                rollback(tx).await?;
                return Err(StoreError::Rejected(errors));
            }
        };

        let role = CustomRole::create(account_id, validated, now);
        Span::current().record("role_id", tracing::field::display(role.id));

        sqlx::query(
            r#"
            INSERT INTO custom_roles (
                id, account_id, name, description, permissions,
                is_system, parent_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.account_id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(permission_strings(&role.permissions))
        .bind(role.is_system)
        .bind(role.parent_id.map(Uuid::from))
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;

        commit(tx).await?;
        Ok(role)
    }

    #[instrument(skip(self, edit), fields(account_id = %account_id, role_id = %role_id), err)]
    async fn update_role(
        &self,
        account_id: AccountId,
        role_id: RoleId,
        edit: EditFn<'_>,
        now: DateTime<Utc>,
    ) -> Result<CustomRole, StoreError> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {ROLE_COLUMNS} FROM custom_roles WHERE account_id = $1 AND id = $2 FOR UPDATE"
        ))
        .bind(account_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_role", e))?;

        let Some(row) = row else {
            rollback(tx).await?;
            return Err(StoreError::NotFound);
        };
        let mut role = role_from_row(&row)?;

        let existing = account_roles_tx(&mut tx, account_id).await?;
        let validated = match edit(&role, &existing) {
            Ok(validated) => validated,
            Err(errors) => {
                rollback(tx).await?;
                return Err(StoreError::Rejected(errors));
            }
        };
        role.apply(validated, now);

        sqlx::query(
            r#"
            UPDATE custom_roles
            SET name = $3, description = $4, permissions = $5, updated_at = $6
            WHERE account_id = $1 AND id = $2
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(role_id.as_uuid())
        .bind(&role.name)
        .bind(&role.description)
        .bind(permission_strings(&role.permissions))
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?;

        commit(tx).await?;
        Ok(role)
    }

    #[instrument(
        skip(self, guard),
        fields(account_id = %account_id, role_id = %role_id, bound_principals = tracing::field::Empty),
        err
    )]
    async fn delete_role(
        &self,
        account_id: AccountId,
        role_id: RoleId,
        guard: DeletionGuard,
    ) -> Result<CustomRole, StoreError> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {ROLE_COLUMNS} FROM custom_roles WHERE account_id = $1 AND id = $2 FOR UPDATE"
        ))
        .bind(account_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_role", e))?;

        let Some(row) = row else {
            rollback(tx).await?;
            return Err(StoreError::NotFound);
        };
        let role = role_from_row(&row)?;

        let bound: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM account_principals WHERE account_id = $1 AND custom_role_id = $2",
        )
        .bind(account_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("count_bindings", e))?;
        let bound = bound.max(0) as u64;
        Span::current().record("bound_principals", bound);

        if let Err(in_use) = guard.authorize_deletion(&role, bound) {
            rollback(tx).await?;
            return Err(StoreError::RoleInUse(in_use));
        }

        sqlx::query("DELETE FROM custom_roles WHERE account_id = $1 AND id = $2")
            .bind(account_id.as_uuid())
            .bind(role_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        commit(tx).await?;
        Ok(role)
    }

    #[instrument(skip(self), fields(account_id = %account_id, role_id = %role_id), err)]
    async fn count_bindings(&self, account_id: AccountId, role_id: RoleId) -> Result<u64, StoreError> {
        let bound: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM account_principals WHERE account_id = $1 AND custom_role_id = $2",
        )
        .bind(account_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_bindings", e))?;

        Ok(bound.max(0) as u64)
    }

    #[instrument(skip(self), fields(account_id = %account_id, principal_id = %principal_id), err)]
    async fn get_assignment(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
    ) -> Result<Option<RoleAssignment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM account_principals WHERE account_id = $1 AND principal_id = $2"
        ))
        .bind(account_id.as_uuid())
        .bind(principal_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_assignment", e))?;

        row.as_ref().map(assignment_from_row).transpose()
    }

    #[instrument(
        skip(self, assignment),
        fields(account_id = %assignment.account_id, principal_id = %assignment.principal_id),
        err
    )]
    async fn save_assignment(&self, assignment: RoleAssignment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO account_principals (account_id, principal_id, system_role, custom_role_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (account_id, principal_id)
            DO UPDATE SET system_role = EXCLUDED.system_role, custom_role_id = EXCLUDED.custom_role_id
            "#,
        )
        .bind(assignment.account_id.as_uuid())
        .bind(assignment.principal_id.as_uuid())
        .bind(assignment.system_role().as_str())
        .bind(assignment.custom_role_id().map(Uuid::from))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_assignment", e))?;

        Ok(())
    }

    #[instrument(skip(self, edit), fields(account_id = %account_id, principal_id = %principal_id), err)]
    async fn update_assignment(
        &self,
        account_id: AccountId,
        principal_id: PrincipalId,
        edit: AssignmentEditFn<'_>,
    ) -> Result<AssignmentUpdate, StoreError> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM account_principals \
             WHERE account_id = $1 AND principal_id = $2 FOR UPDATE"
        ))
        .bind(account_id.as_uuid())
        .bind(principal_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_assignment", e))?;

        let Some(row) = row else {
            rollback(tx).await?;
            return Err(StoreError::PrincipalNotFound);
        };
        let previous = assignment_from_row(&row)?;

        let mut current = previous.clone();
        if let Err(err) = edit(&mut current) {
            rollback(tx).await?;
            return Err(StoreError::Refused(err));
        }

        if let Some(role_id) = current.custom_role_id() {
            let present: Option<i32> = sqlx::query_scalar(
                "SELECT 1 FROM custom_roles WHERE account_id = $1 AND id = $2 FOR KEY SHARE",
            )
            .bind(account_id.as_uuid())
            .bind(role_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_bound_role", e))?;

            if present.is_none() {
                rollback(tx).await?;
                return Err(StoreError::NotFound);
            }
        }

        sqlx::query(
            r#"
            UPDATE account_principals
            SET system_role = $3, custom_role_id = $4
            WHERE account_id = $1 AND principal_id = $2
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(principal_id.as_uuid())
        .bind(current.system_role().as_str())
        .bind(current.custom_role_id().map(Uuid::from))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_assignment", e))?;

        commit(tx).await?;
        Ok(AssignmentUpdate { previous, current })
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn remove_account(&self, account_id: AccountId) -> Result<u64, StoreError> {
        let mut tx = self.begin().await?;

        sqlx::query("DELETE FROM account_principals WHERE account_id = $1")
            .bind(account_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_account_principals", e))?;

        let removed = sqlx::query("DELETE FROM custom_roles WHERE account_id = $1")
            .bind(account_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_account_roles", e))?
            .rows_affected();

        commit(tx).await?;
        Ok(removed)
    }
}

fn permission_strings(permissions: &[Permission]) -> Vec<String> {
    permissions.iter().map(|p| p.as_str().to_string()).collect()
}

fn decode_error(column: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode column {column}: {err}"))
}

fn role_from_row(row: &PgRow) -> Result<CustomRole, StoreError> {
    let id: Uuid = row.try_get("id").map_err(|e| decode_error("id", e))?;
    let account_id: Uuid = row.try_get("account_id").map_err(|e| decode_error("account_id", e))?;
    let permissions: Vec<String> = row
        .try_get("permissions")
        .map_err(|e| decode_error("permissions", e))?;
    let parent_id: Option<Uuid> = row.try_get("parent_id").map_err(|e| decode_error("parent_id", e))?;

    Ok(CustomRole {
        id: RoleId::from_uuid(id),
        account_id: AccountId::from_uuid(account_id),
        name: row.try_get("name").map_err(|e| decode_error("name", e))?,
        description: row
            .try_get("description")
            .map_err(|e| decode_error("description", e))?,
        permissions: permissions.into_iter().map(Permission::new).collect(),
        is_system: row.try_get("is_system").map_err(|e| decode_error("is_system", e))?,
        parent_id: parent_id.map(RoleId::from_uuid),
        created_at: row.try_get("created_at").map_err(|e| decode_error("created_at", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| decode_error("updated_at", e))?,
    })
}

fn assignment_from_row(row: &PgRow) -> Result<RoleAssignment, StoreError> {
    let account_id: Uuid = row.try_get("account_id").map_err(|e| decode_error("account_id", e))?;
    let principal_id: Uuid = row
        .try_get("principal_id")
        .map_err(|e| decode_error("principal_id", e))?;
    let system_role: String = row
        .try_get("system_role")
        .map_err(|e| decode_error("system_role", e))?;
    let custom_role_id: Option<Uuid> = row
        .try_get("custom_role_id")
        .map_err(|e| decode_error("custom_role_id", e))?;

    let system_role: SystemRole = system_role.parse().map_err(StoreError::Integrity)?;
    let binding = match custom_role_id {
        Some(id) => RoleBinding::Custom(RoleId::from_uuid(id)),
        None => RoleBinding::System(system_role),
    };

    Ok(RoleAssignment {
        principal_id: PrincipalId::from_uuid(principal_id),
        account_id: AccountId::from_uuid(account_id),
        binding,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::DuplicateName,
                Some("23503") | Some("23514") => StoreError::Integrity(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {}", operation)),
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use rolegate_auth::RoleDraft;

    use super::*;

    #[test]
    fn non_database_errors_are_backend_failures() {
        assert!(matches!(
            map_sqlx_error("list_roles", sqlx::Error::PoolClosed),
            StoreError::Backend(msg) if msg.contains("list_roles")
        ));
        assert!(matches!(
            map_sqlx_error("get_role", sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn schema_declares_account_scoped_keys() {
        assert!(SCHEMA_SQL.contains("UNIQUE (account_id, name)"));
        assert!(SCHEMA_SQL.contains("ON DELETE SET NULL (custom_role_id)"));
    }


    /// Runs only when `DATABASE_URL` points at a disposable database.
    #[tokio::test]
    async fn round_trip_against_live_database() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let store = PostgresRoleStore::connect(&url).await.unwrap();
        store.migrate().await.unwrap();

        let account = AccountId::new();
        let validator = rolegate_auth::RoleValidator::default();
        let draft = RoleDraft::new("Support Lead", "leads", ["conversation_manage", "report_manage"]);
        let check = |roles: &[CustomRole]| validator.validate(&draft, account, roles, None);

        let role = store.create_role(account, &check, Utc::now()).await.unwrap();
        assert!(matches!(
            store.create_role(account, &check, Utc::now()).await,
            Err(StoreError::Rejected(_))
        ));

        let mut assignment = RoleAssignment::agent(PrincipalId::new(), account);
        assignment.bind_custom_role(&role).unwrap();
        store.save_assignment(assignment.clone()).await.unwrap();
        assert_eq!(
            store.get_assignment(account, assignment.principal_id).await.unwrap(),
            Some(assignment.clone())
        );

        assert!(matches!(
            store.delete_role(account, role.id, DeletionGuard).await,
            Err(StoreError::RoleInUse(_))
        ));

        let promote = |a: &mut RoleAssignment| -> Result<(), rolegate_core::DomainError> {
            a.promote_to_administrator();
            Ok(())
        };
        let update = store
            .update_assignment(account, assignment.principal_id, &promote)
            .await
            .unwrap();
        assert_eq!(update.current.binding, RoleBinding::System(SystemRole::Administrator));

        let bind = |a: &mut RoleAssignment| a.bind_custom_role(&role);
        assert!(matches!(
            store.update_assignment(account, assignment.principal_id, &bind).await,
            Err(StoreError::Refused(_))
        ));

        let lower = RoleDraft::new("alpha", "lower", ["report_manage"]);
        let check_lower = |roles: &[CustomRole]| validator.validate(&lower, account, roles, None);
        store.create_role(account, &check_lower, Utc::now()).await.unwrap();
        let names: Vec<String> = store
            .list_roles(account)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Support Lead", "alpha"]);

        assert_eq!(store.remove_account(account).await.unwrap(), 2);
    }
}
