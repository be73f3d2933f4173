//! Process configuration, read from the environment.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use thiserror::Error;

use rolegate_core::AccountId;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid socket address `{value}`")]
    InvalidBindAddr { var: &'static str, value: String },

    #[error("{var}: expected true/false, got `{value}`")]
    InvalidBool { var: &'static str, value: String },

    #[error("{var}: invalid account id `{value}`")]
    InvalidAccountId { var: &'static str, value: String },
}

/// Whether the custom-roles capability is available to an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFlags {
    pub custom_roles_enabled: bool,
    pub disabled_accounts: BTreeSet<AccountId>,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            custom_roles_enabled: true,
            disabled_accounts: BTreeSet::new(),
        }
    }
}

impl FeatureFlags {
    pub fn custom_roles_enabled_for(&self, account_id: AccountId) -> bool {
        self.custom_roles_enabled && !self.disabled_accounts.contains(&account_id)
    }

    pub fn disable_for(mut self, account_id: AccountId) -> Self {
        self.disabled_accounts.insert(account_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Postgres when set, in-memory store otherwise.
    pub database_url: Option<String>,
    pub features: FeatureFlags,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr: SocketAddr = {
            const VAR: &str = "ROLEGATE_BIND_ADDR";
            let value = get(VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddr { var: VAR, value })?
        };

        let custom_roles_enabled = match get("ROLEGATE_CUSTOM_ROLES_ENABLED") {
            Some(value) => parse_bool("ROLEGATE_CUSTOM_ROLES_ENABLED", value)?,
            None => true,
        };

        let mut disabled_accounts: BTreeSet<AccountId> = BTreeSet::new();
        if let Some(list) = get("ROLEGATE_CUSTOM_ROLES_DISABLED_ACCOUNTS") {
            for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let account_id: AccountId = item.parse().map_err(|_| ConfigError::InvalidAccountId {
                    var: "ROLEGATE_CUSTOM_ROLES_DISABLED_ACCOUNTS",
                    value: item.to_string(),
                })?;
                disabled_accounts.insert(account_id);
            }
        }

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            features: FeatureFlags {
                custom_roles_enabled,
                disabled_accounts,
            },
        })
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}
