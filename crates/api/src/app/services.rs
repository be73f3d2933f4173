//! Service wiring: role store selection and the coordinator built over it.

use std::sync::Arc;

use rolegate_auth::AuthorizationEngine;
use rolegate_infra::{InMemoryRoleStore, PostgresRoleStore, RoleLifecycleCoordinator, RoleStore, StoreError};

use crate::config::{ApiConfig, FeatureFlags};

pub type DynRoleStore = Arc<dyn RoleStore>;

pub struct AppServices {
    pub roles: RoleLifecycleCoordinator<DynRoleStore>,
    pub engine: AuthorizationEngine<'static>,
    pub features: FeatureFlags,
}

impl AppServices {
    pub fn new(store: DynRoleStore, features: FeatureFlags) -> Self {
        Self {
            roles: RoleLifecycleCoordinator::new(store),
            engine: AuthorizationEngine::default(),
            features,
        }
    }

    pub fn in_memory(features: FeatureFlags) -> Self {
        Self::new(Arc::new(InMemoryRoleStore::new()), features)
    }

    /// Postgres when `DATABASE_URL` is configured (schema applied on start),
    /// in-memory otherwise.
    pub async fn from_config(config: &ApiConfig) -> Result<Self, StoreError> {
        let store: DynRoleStore = match &config.database_url {
            Some(url) => {
                let store = PostgresRoleStore::connect(url).await?;
                store.migrate().await?;
                tracing::info!("using postgres role store");
                Arc::new(store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory role store");
                Arc::new(InMemoryRoleStore::new())
            }
        };

        Ok(Self::new(store, config.features.clone()))
    }
}
