//! Infrastructure layer: role persistence and lifecycle orchestration.

pub mod role_lifecycle;
pub mod role_store;

pub use role_lifecycle::{LifecycleError, RoleLifecycleCoordinator, RoleSummary};
pub use role_store::{
    AssignmentEditFn, AssignmentUpdate, EditFn, InMemoryRoleStore, PostgresRoleStore, RoleStore, StoreError,
    ValidateFn,
};
