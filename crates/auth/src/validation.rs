//! Role validation: structural and semantic checks on a draft before it is
//! persisted.
//!
//! Every check runs; nothing short-circuits. Callers get one
//! [`ValidationErrors`] map with all violations so each field can show its own
//! feedback.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use rolegate_core::{AccountId, RoleId};

use crate::catalog::{PermissionCatalog, PermissionCategory};
use crate::permissions::Permission;
use crate::roles::{CustomRole, RoleDraft};

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MIN_CHARS: usize = 1;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

pub const MSG_BLANK: &str = "can't be blank";
pub const MSG_NAME_TAKEN: &str = "must be unique within account";
pub const MSG_NO_PERMISSIONS: &str = "at least one permission must be selected";
pub const MSG_CONVERSATION_CONFLICT: &str =
    "cannot have multiple conversation management permissions. Please select only one.";

/// Draft field a validation message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Description,
    Permissions,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Description => "description",
            Self::Permissions => "permissions",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Description => "Description",
            Self::Permissions => "Permissions",
        }
    }
}

/// Field → messages map describing why a draft was rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[serde(transparent)]
#[error("validation failed: {}", messages_of(.errors).join("; "))]
pub struct ValidationErrors {
    errors: BTreeMap<Field, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single-field failure.
    pub fn single(field: Field, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: Field, message: impl Into<String>) {
        self.errors.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: Field) -> &[String] {
        self.errors.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, field: Field) -> bool {
        self.errors.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.errors.keys().copied()
    }

    /// `"Name can't be blank"` style lines, in field order.
    pub fn full_messages(&self) -> Vec<String> {
        messages_of(&self.errors)
    }
}

fn messages_of(errors: &BTreeMap<Field, Vec<String>>) -> Vec<String> {
    errors
        .iter()
        .flat_map(|(field, messages)| {
            messages
                .iter()
                .map(move |m| format!("{} {}", field.label(), m))
        })
        .collect()
}

/// Normalized draft that passed validation.
///
/// Name and description are trimmed; permissions are de-duplicated and in
/// catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub name: String,
    pub description: String,
    pub permissions: Vec<Permission>,
}

/// Checks drafts against the permission catalog and the account's roles.
#[derive(Debug, Clone, Copy)]
pub struct RoleValidator<'c> {
    catalog: &'c PermissionCatalog,
}

impl Default for RoleValidator<'static> {
    fn default() -> Self {
        Self::new(PermissionCatalog::global())
    }
}

impl<'c> RoleValidator<'c> {
    pub fn new(catalog: &'c PermissionCatalog) -> Self {
        Self { catalog }
    }

    /// Validate `draft` for `account_id`.
    ///
    /// `existing_roles` is the account's current roles; roles from other
    /// accounts are ignored. When updating, pass the edited role's id as
    /// `existing_role_id` so it does not collide with itself.
    pub fn validate(
        &self,
        draft: &RoleDraft,
        account_id: AccountId,
        existing_roles: &[CustomRole],
        existing_role_id: Option<RoleId>,
    ) -> Result<ValidatedDraft, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let name = draft.name.trim();
        check_length(&mut errors, Field::Name, name, NAME_MIN_CHARS, NAME_MAX_CHARS);

        let description = draft.description.trim();
        check_length(
            &mut errors,
            Field::Description,
            description,
            DESCRIPTION_MIN_CHARS,
            DESCRIPTION_MAX_CHARS,
        );

        let permissions = self.check_permissions(&mut errors, &draft.permissions);

        let taken = !name.is_empty()
            && existing_roles.iter().any(|role| {
                role.account_id == account_id
                    && Some(role.id) != existing_role_id
                    && role.name == name
            });
        if taken {
            errors.add(Field::Name, MSG_NAME_TAKEN);
        }

        if !errors.is_empty() {
            tracing::debug!(%account_id, fields = ?errors.fields().collect::<Vec<_>>(), "role draft rejected");
            return Err(errors);
        }

        Ok(ValidatedDraft {
            name: name.to_string(),
            description: description.to_string(),
            permissions,
        })
    }

    fn check_permissions(&self, errors: &mut ValidationErrors, requested: &[String]) -> Vec<Permission> {
        if requested.is_empty() {
            errors.add(Field::Permissions, MSG_NO_PERMISSIONS);
            return Vec::new();
        }

        let unique: BTreeSet<&str> = requested.iter().map(String::as_str).collect();

        let invalid: Vec<&str> = requested
            .iter()
            .map(String::as_str)
            .filter(|p| !self.catalog.contains(p))
            .fold(Vec::new(), |mut acc, p| {
                if !acc.contains(&p) {
                    acc.push(p);
                }
                acc
            });
        if !invalid.is_empty() {
            errors.add(
                Field::Permissions,
                format!("contains invalid permissions: {}", invalid.join(", ")),
            );
        }

        for category in PermissionCategory::ALL {
            if !category.is_exclusive() {
                continue;
            }
            let held = unique
                .iter()
                .filter(|p| self.catalog.category_of(p) == Some(category))
                .count();
            if held > 1 {
                errors.add(Field::Permissions, exclusivity_message(category));
            }
        }

        self.catalog
            .entries()
            .iter()
            .filter(|e| unique.contains(e.id))
            .map(|e| e.permission())
            .collect()
    }
}

fn exclusivity_message(category: PermissionCategory) -> String {
    match category {
        PermissionCategory::Conversation => MSG_CONVERSATION_CONFLICT.to_string(),
        other => format!("cannot have multiple {other} permissions. Please select only one."),
    }
}

fn check_length(errors: &mut ValidationErrors, field: Field, value: &str, min: usize, max: usize) {
    let chars = value.chars().count();
    if chars == 0 {
        errors.add(field, MSG_BLANK);
    } else if chars < min {
        errors.add(field, format!("is too short (minimum is {min} characters)"));
    } else if chars > max {
        errors.add(field, format!("is too long (maximum is {max} characters)"));
    }
}
