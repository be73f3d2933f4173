//! `rolegate-auth` — custom-role permission model and authorization decisions.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod catalog;
pub mod deletion;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod validation;

pub use authorize::{
    AuthorizationEngine, AuthorizationExplanation, AuthzError, ConversationScope, EffectivePermissions,
    EffectiveRole,
};
pub use catalog::{CATALOG, CatalogEntry, PermissionCatalog, PermissionCategory, humanize};
pub use deletion::{DeletionGuard, RoleInUse};
pub use permissions::Permission;
pub use principal::{Principal, PrincipalRole, RoleAssignment, RoleBinding};
pub use roles::{ConversationPermissionLevel, CustomRole, RoleDraft, RolePatch, SystemRole};
pub use validation::{Field, RoleValidator, ValidatedDraft, ValidationErrors};
