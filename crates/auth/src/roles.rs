//! System roles and account-scoped custom roles.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rolegate_core::{AccountId, Entity, RoleId};

use crate::catalog::{PermissionCatalog, PermissionCategory, humanize};
use crate::permissions::{
    CONVERSATION_MANAGE, CONVERSATION_PARTICIPATING_MANAGE, CONVERSATION_UNASSIGNED_MANAGE,
    Permission,
};
use crate::validation::ValidatedDraft;

/// Built-in role every principal has when no custom role is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemRole {
    Administrator,
    Agent,
}

impl SystemRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Agent => "agent",
        }
    }

    /// The role as a permission tag (`administrator` / `agent`).
    pub fn tag(self) -> Permission {
        Permission::from_static(self.as_str())
    }

    pub fn display_name(self) -> String {
        humanize(self.as_str())
    }
}

impl core::fmt::Display for SystemRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for SystemRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "administrator" => Ok(Self::Administrator),
            "agent" => Ok(Self::Agent),
            other => Err(format!("unknown system role '{other}'")),
        }
    }
}

/// Conversation capability of a principal (or of a role), broadest first.
///
/// `Agent` and `None` are distinct: `Agent` means "no custom role, default
/// agent behaviour", `None` means "custom role without any conversation
/// permission".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPermissionLevel {
    Administrator,
    ManageAll,
    ManageUnassigned,
    ManageParticipating,
    Agent,
    None,
}

impl ConversationPermissionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::ManageAll => "manage_all",
            Self::ManageUnassigned => "manage_unassigned",
            Self::ManageParticipating => "manage_participating",
            Self::Agent => "agent",
            Self::None => "none",
        }
    }
}

impl core::fmt::Display for ConversationPermissionLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated role input, as submitted by an administrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl RoleDraft {
    pub fn new<I, S>(name: impl Into<String>, description: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Partial edit of a role; absent fields keep the role's current value.
///
/// Merged against the role as it stands inside the write transaction, so a
/// patch only overwrites the fields it names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

impl RolePatch {
    pub fn merge_into(&self, current: &CustomRole) -> RoleDraft {
        RoleDraft {
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| current.description.clone()),
            permissions: self.permissions.clone().unwrap_or_else(|| {
                current.permissions.iter().map(|p| p.as_str().to_string()).collect()
            }),
        }
    }
}

impl From<RoleDraft> for RolePatch {
    fn from(draft: RoleDraft) -> Self {
        Self {
            name: Some(draft.name),
            description: Some(draft.description),
            permissions: Some(draft.permissions),
        }
    }
}

/// An account-scoped, named bundle of catalog permissions.
///
/// # Invariants
/// - `name` is trimmed and unique within `account_id` (enforced by the store).
/// - `permissions` is non-empty, a subset of the catalog, in catalog order,
///   and holds at most one `conversation` permission.
/// - `parent_id` is reserved; no inheritance is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRole {
    pub id: RoleId,
    pub account_id: AccountId,
    pub name: String,
    pub description: String,
    pub permissions: Vec<Permission>,
    pub is_system: bool,
    pub parent_id: Option<RoleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomRole {
    /// Build a new role from a validated draft.
    pub fn create(account_id: AccountId, draft: ValidatedDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: RoleId::new(),
            account_id,
            name: draft.name,
            description: draft.description,
            permissions: draft.permissions,
            is_system: false,
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an administrator edit (name, description, permissions).
    pub fn apply(&mut self, draft: ValidatedDraft, now: DateTime<Utc>) {
        self.name = draft.name;
        self.description = draft.description;
        self.permissions = draft.permissions;
        self.updated_at = now;
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p.as_str() == permission)
    }

    pub fn permissions_by_category(
        &self,
        catalog: &PermissionCatalog,
    ) -> BTreeMap<PermissionCategory, Vec<Permission>> {
        catalog.group_by_category(&self.permissions)
    }

    /// Role-level conversation capability; never `Administrator` or `Agent`.
    pub fn conversation_permission_level(&self) -> ConversationPermissionLevel {
        if self.has_permission(CONVERSATION_MANAGE.as_str()) {
            ConversationPermissionLevel::ManageAll
        } else if self.has_permission(CONVERSATION_UNASSIGNED_MANAGE.as_str()) {
            ConversationPermissionLevel::ManageUnassigned
        } else if self.has_permission(CONVERSATION_PARTICIPATING_MANAGE.as_str()) {
            ConversationPermissionLevel::ManageParticipating
        } else {
            ConversationPermissionLevel::None
        }
    }
}

impl Entity for CustomRole {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn account_id(&self) -> AccountId {
        self.account_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CATALOG;
    use crate::permissions::{CONTACT_MANAGE, REPORT_MANAGE};

    fn role_with(permissions: Vec<Permission>) -> CustomRole {
        CustomRole::create(
            AccountId::new(),
            ValidatedDraft {
                name: "Support Lead".to_string(),
                description: "Handles escalations".to_string(),
                permissions,
            },
            Utc::now(),
        )
    }

    #[test]
    fn role_level_follows_broadest_conversation_permission() {
        let role = role_with(vec![CONVERSATION_UNASSIGNED_MANAGE, REPORT_MANAGE]);
        assert_eq!(
            role.conversation_permission_level(),
            ConversationPermissionLevel::ManageUnassigned
        );

        // Not constructible through the validator, but the ranking still picks the broadest.
        let role = role_with(vec![CONVERSATION_PARTICIPATING_MANAGE, CONVERSATION_MANAGE]);
        assert_eq!(
            role.conversation_permission_level(),
            ConversationPermissionLevel::ManageAll
        );

        let role = role_with(vec![CONTACT_MANAGE]);
        assert_eq!(
            role.conversation_permission_level(),
            ConversationPermissionLevel::None
        );
    }

    #[test]
    fn permissions_by_category_splits_groups() {
        let role = role_with(vec![CONVERSATION_MANAGE, CONTACT_MANAGE]);
        let groups = role.permissions_by_category(&CATALOG);

        assert_eq!(groups[&PermissionCategory::Conversation], vec![CONVERSATION_MANAGE]);
        assert_eq!(groups[&PermissionCategory::Management], vec![CONTACT_MANAGE]);
    }

    #[test]
    fn apply_updates_fields_and_timestamp() {
        let mut role = role_with(vec![CONTACT_MANAGE]);
        let created_at = role.created_at;
        let later = created_at + chrono::Duration::seconds(5);

        role.apply(
            ValidatedDraft {
                name: "Renamed".to_string(),
                description: "New text".to_string(),
                permissions: vec![REPORT_MANAGE],
            },
            later,
        );

        assert_eq!(role.name, "Renamed");
        assert_eq!(role.permissions, vec![REPORT_MANAGE]);
        assert_eq!(role.created_at, created_at);
        assert_eq!(role.updated_at, later);
    }

    #[test]
    fn system_role_parses_and_displays() {
        assert_eq!("agent".parse::<SystemRole>(), Ok(SystemRole::Agent));
        assert!("owner".parse::<SystemRole>().is_err());
        assert_eq!(SystemRole::Administrator.display_name(), "Administrator");
        assert_eq!(SystemRole::Agent.tag(), Permission::from_static("agent"));
    }

    #[test]
    fn patch_keeps_unspecified_fields() {
        let role = role_with(vec![CONTACT_MANAGE, REPORT_MANAGE]);
        let patch: RolePatch = serde_json::from_str(r#"{"description":"new"}"#).unwrap();

        let draft = patch.merge_into(&role);

        assert_eq!(draft.name, role.name);
        assert_eq!(draft.description, "new");
        assert_eq!(draft.permissions, vec!["contact_manage", "report_manage"]);
    }

    #[test]
    fn full_draft_patch_replaces_every_field() {
        let role = role_with(vec![CONTACT_MANAGE]);
        let draft = RoleDraft::new("Other", "", ["report_manage"]);

        assert_eq!(RolePatch::from(draft.clone()).merge_into(&role), draft);
    }

    #[test]
    fn draft_deserializes_with_missing_fields() {
        let draft: RoleDraft = serde_json::from_str(r#"{"name":"Ops"}"#).unwrap();
        assert_eq!(draft.name, "Ops");
        assert!(draft.description.is_empty());
        assert!(draft.permissions.is_empty());
    }
}
