//! Deletion guard: a role may only be removed while nothing references it.

use serde::Serialize;
use thiserror::Error;

use rolegate_core::RoleId;

use crate::roles::CustomRole;

/// Deletion was refused because principals are still bound to the role.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
#[error("custom role {role_id} is assigned to {bound_principals} principal(s)")]
pub struct RoleInUse {
    pub role_id: RoleId,
    pub bound_principals: u64,
}

/// Decides whether a role can be removed, given how many principals are
/// bound to it. Holds no state and never mutates anything; the store runs it
/// inside the same transaction that counts the bindings and deletes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeletionGuard;

impl DeletionGuard {
    pub fn is_deletable(&self, _role: &CustomRole, bound_principals: u64) -> bool {
        bound_principals == 0
    }

    pub fn authorize_deletion(&self, role: &CustomRole, bound_principals: u64) -> Result<(), RoleInUse> {
        if self.is_deletable(role, bound_principals) {
            Ok(())
        } else {
            Err(RoleInUse {
                role_id: role.id,
                bound_principals,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rolegate_core::AccountId;

    use super::*;
    use crate::permissions::REPORT_MANAGE;
    use crate::validation::ValidatedDraft;

    fn role() -> CustomRole {
        CustomRole::create(
            AccountId::new(),
            ValidatedDraft {
                name: "Reports".to_string(),
                description: "reporting".to_string(),
                permissions: vec![REPORT_MANAGE],
            },
            Utc::now(),
        )
    }

    #[test]
    fn unbound_role_is_deletable() {
        let role = role();
        assert!(DeletionGuard.is_deletable(&role, 0));
        assert_eq!(DeletionGuard.authorize_deletion(&role, 0), Ok(()));
    }

    #[test]
    fn bound_role_reports_exact_count() {
        let role = role();
        assert!(!DeletionGuard.is_deletable(&role, 3));

        let err = DeletionGuard.authorize_deletion(&role, 3).unwrap_err();
        assert_eq!(err.bound_principals, 3);
        assert_eq!(err.role_id, role.id);
        assert!(err.to_string().contains("3 principal(s)"));
    }
}
