use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "contact_manage"). Whether a
/// string is a *grantable* permission is decided by the
/// [`PermissionCatalog`](crate::catalog::PermissionCatalog), not by this type:
/// drafts arrive with arbitrary strings and the validator reports the unknown
/// ones. Effective-permission sets also carry marker tags (`custom_role`,
/// `agent`, `administrator`) using the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Permission {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Permission {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

pub const CONVERSATION_MANAGE: Permission = Permission::from_static("conversation_manage");
pub const CONVERSATION_UNASSIGNED_MANAGE: Permission =
    Permission::from_static("conversation_unassigned_manage");
pub const CONVERSATION_PARTICIPATING_MANAGE: Permission =
    Permission::from_static("conversation_participating_manage");
pub const CONTACT_MANAGE: Permission = Permission::from_static("contact_manage");
pub const REPORT_MANAGE: Permission = Permission::from_static("report_manage");
pub const KNOWLEDGE_BASE_MANAGE: Permission = Permission::from_static("knowledge_base_manage");

/// Marker carried in the effective permissions of a custom-role principal.
pub const CUSTOM_ROLE_TAG: Permission = Permission::from_static("custom_role");
