//! Checked-in display copy of the permission catalog.
//!
//! The dashboard reads `static/permission_catalog.json` verbatim. It must list
//! exactly the catalog's permissions, in catalog order, with the same
//! descriptions and categories; [`verify`] reports any drift and the binary
//! refuses to start on a mismatch.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use rolegate_auth::PermissionCatalog;

pub const MIRROR_JSON: &str = include_str!("../../static/permission_catalog.json");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogMirror {
    pub permissions: Vec<String>,
    pub descriptions: BTreeMap<String, String>,
    pub categories: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Error)]
pub enum MirrorDrift {
    #[error("mirror is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("permission list differs: mirror {mirror:?}, catalog {catalog:?}")]
    Permissions { mirror: Vec<String>, catalog: Vec<String> },

    #[error("description of `{0}` differs")]
    Description(String),

    #[error("category `{0}` differs")]
    Category(String),
}

impl CatalogMirror {
    pub fn parse(json: &str) -> Result<Self, MirrorDrift> {
        Ok(serde_json::from_str(json)?)
    }

    /// The mirror as the catalog says it should read.
    pub fn from_catalog(catalog: &PermissionCatalog) -> Self {
        let permissions = catalog.permission_ids().map(str::to_string).collect();
        let descriptions = catalog
            .entries()
            .iter()
            .map(|e| (e.id.to_string(), catalog.describe(e.id).into_owned()))
            .collect();
        let categories = catalog
            .group_by_category(&catalog.permissions())
            .into_iter()
            .map(|(category, permissions)| {
                (
                    category.as_str().to_string(),
                    permissions.into_iter().map(|p| p.as_str().to_string()).collect(),
                )
            })
            .collect();

        Self {
            permissions,
            descriptions,
            categories,
        }
    }

    pub fn check_against(&self, catalog: &PermissionCatalog) -> Result<(), MirrorDrift> {
        let expected = Self::from_catalog(catalog);

        if self.permissions != expected.permissions {
            return Err(MirrorDrift::Permissions {
                mirror: self.permissions.clone(),
                catalog: expected.permissions,
            });
        }
        for (id, description) in &expected.descriptions {
            if self.descriptions.get(id) != Some(description) {
                return Err(MirrorDrift::Description(id.clone()));
            }
        }
        if let Some(extra) = self.descriptions.keys().find(|id| !expected.descriptions.contains_key(*id)) {
            return Err(MirrorDrift::Description(extra.clone()));
        }
        for (category, members) in &expected.categories {
            if self.categories.get(category) != Some(members) {
                return Err(MirrorDrift::Category(category.clone()));
            }
        }
        if let Some(extra) = self.categories.keys().find(|c| !expected.categories.contains_key(*c)) {
            return Err(MirrorDrift::Category(extra.clone()));
        }
        Ok(())
    }
}

/// Check the checked-in mirror against `catalog`.
pub fn verify(catalog: &PermissionCatalog) -> Result<(), MirrorDrift> {
    CatalogMirror::parse(MIRROR_JSON)?.check_against(catalog)
}
