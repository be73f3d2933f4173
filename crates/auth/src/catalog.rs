//! Permission catalog: the frozen registry of grantable permissions.
//!
//! The catalog is a `static` table. Nothing mutates it at runtime; callers that
//! need a different table (tests, tooling) build their own
//! [`PermissionCatalog`] over another `'static` slice.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::permissions::Permission;

/// Grouping of permissions that share a combination rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCategory {
    /// Mutually exclusive: at most one per role.
    Conversation,
    /// Independent: any combination is allowed.
    Management,
}

impl PermissionCategory {
    pub const ALL: [PermissionCategory; 2] = [Self::Conversation, Self::Management];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Management => "management",
        }
    }

    /// True when a role may carry at most one permission of this category.
    pub fn is_exclusive(self) -> bool {
        matches!(self, Self::Conversation)
    }
}

impl core::fmt::Display for PermissionCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub category: PermissionCategory,
    pub description: Option<&'static str>,
}

impl CatalogEntry {
    pub const fn new(
        id: &'static str,
        category: PermissionCategory,
        description: &'static str,
    ) -> Self {
        Self {
            id,
            category,
            description: Some(description),
        }
    }

    pub fn permission(&self) -> Permission {
        Permission::from_static(self.id)
    }
}

const ENTRIES: &[CatalogEntry] = &[
    CatalogEntry::new(
        "conversation_manage",
        PermissionCategory::Conversation,
        "Can manage all conversations within assigned inboxes",
    ),
    CatalogEntry::new(
        "conversation_unassigned_manage",
        PermissionCategory::Conversation,
        "Can manage unassigned conversations and those assigned to them",
    ),
    CatalogEntry::new(
        "conversation_participating_manage",
        PermissionCategory::Conversation,
        "Can manage conversations they are participating in or assigned to",
    ),
    CatalogEntry::new(
        "contact_manage",
        PermissionCategory::Management,
        "Can create, update, and manage contacts",
    ),
    CatalogEntry::new(
        "report_manage",
        PermissionCategory::Management,
        "Can access and view reports and analytics",
    ),
    CatalogEntry::new(
        "knowledge_base_manage",
        PermissionCategory::Management,
        "Can create, edit, and manage knowledge base articles and portals",
    ),
];

/// The catalog every role in the system is validated against.
pub static CATALOG: PermissionCatalog = PermissionCatalog::from_entries(ENTRIES);

/// Ordered, immutable registry of grantable permissions.
#[derive(Debug, Clone, Copy)]
pub struct PermissionCatalog {
    entries: &'static [CatalogEntry],
}

impl PermissionCatalog {
    pub const fn from_entries(entries: &'static [CatalogEntry]) -> Self {
        Self { entries }
    }

    pub fn global() -> &'static PermissionCatalog {
        &CATALOG
    }

    /// All entries, in registration order.
    pub fn entries(&self) -> &'static [CatalogEntry] {
        self.entries
    }

    /// All permission ids, in registration order.
    pub fn permission_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    pub fn permissions(&self) -> Vec<Permission> {
        self.entries.iter().map(CatalogEntry::permission).collect()
    }

    pub fn entry(&self, id: &str) -> Option<&'static CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entry(id).is_some()
    }

    /// Registration index, used to keep stored permission lists in catalog order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn category_of(&self, id: &str) -> Option<PermissionCategory> {
        self.entry(id).map(|e| e.category)
    }

    pub fn permissions_in(
        &self,
        category: PermissionCategory,
    ) -> impl Iterator<Item = &'static str> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.category == category)
            .map(|e| e.id)
    }

    /// Human-readable description.
    ///
    /// Unregistered ids (and entries registered without a description) fall
    /// back to [`humanize`].
    pub fn describe(&self, id: &str) -> Cow<'static, str> {
        match self.entry(id).and_then(|e| e.description) {
            Some(description) => Cow::Borrowed(description),
            None => Cow::Owned(humanize(id)),
        }
    }

    /// Group `permissions` by category, dropping empty groups and anything
    /// the catalog does not know. Groups keep catalog order.
    pub fn group_by_category<'a, I>(
        &self,
        permissions: I,
    ) -> BTreeMap<PermissionCategory, Vec<Permission>>
    where
        I: IntoIterator<Item = &'a Permission>,
    {
        let held: Vec<&Permission> = permissions.into_iter().collect();
        let mut groups: BTreeMap<PermissionCategory, Vec<Permission>> = BTreeMap::new();

        for entry in self.entries {
            if held.iter().any(|p| p.as_str() == entry.id) {
                groups.entry(entry.category).or_default().push(entry.permission());
            }
        }

        groups
    }
}

/// Deterministic display form of an identifier.
///
/// Drops a trailing `_id`, turns `_` and `-` into spaces, collapses runs of
/// whitespace, lowercases, then capitalizes the first character:
/// `"audit_log_view"` becomes `"Audit log view"`.
pub fn humanize(identifier: &str) -> String {
    let trimmed = identifier.strip_suffix("_id").unwrap_or(identifier);

    let spaced: String = trimmed
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();

    let words: Vec<String> = spaced.split_whitespace().map(str::to_lowercase).collect();
    let joined = words.join(" ");

    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
