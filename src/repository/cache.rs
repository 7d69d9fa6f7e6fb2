//! Cache-aside wrapper for rarely-changing configuration.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

use super::admin_config_repo::AdminConfigRepository;
use crate::core::models::AdminConfig;
use crate::errors::AdminConfigError;

struct Snapshot {
    configs: Vec<AdminConfig>,
    loaded_at: Instant,
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Snapshot>,
    /// Bumped on every invalidation; a load that started under an older epoch
    /// is not stored.
    epoch: u64,
}

/// Serves `get_all` (and therefore `get`) from a snapshot that lives for `ttl`.
/// Every write invalidates the snapshot, whether or not it succeeded, since a
/// failed write may have been partially applied.
pub struct CachedAdminConfigRepo<R> {
    inner: R,
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl<R: AdminConfigRepository> CachedAdminConfigRepo<R> {
    /// A zero `ttl` disables caching.
    #[must_use]
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            state: RwLock::new(CacheState::default()),
        }
    }

    #[must_use]
    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.snapshot = None;
        state.epoch = state.epoch.wrapping_add(1);
    }

    fn cached(&self) -> Result<Vec<AdminConfig>, u64> {
        let state = self.state.read();
        match &state.snapshot {
            Some(snapshot) if snapshot.loaded_at.elapsed() < self.ttl => Ok(snapshot.configs.clone()),
            _ => Err(state.epoch),
        }
    }

    fn store(&self, epoch: u64, configs: &[AdminConfig]) {
        if self.ttl.is_zero() {
            return;
        }
        let mut state = self.state.write();
        if state.epoch == epoch {
            state.snapshot = Some(Snapshot {
                configs: configs.to_vec(),
                loaded_at: Instant::now(),
            });
        }
    }
}

#[async_trait]
impl<R: AdminConfigRepository> AdminConfigRepository for CachedAdminConfigRepo<R> {
    async fn get_all(&self) -> Result<Vec<AdminConfig>, AdminConfigError> {
        let epoch = match self.cached() {
            Ok(configs) => {
                debug!(count = configs.len(), "Admin configuration cache hit");
                return Ok(configs);
            }
            Err(epoch) => epoch,
        };

        let configs = self.inner.get_all().await?;
        self.store(epoch, &configs);
        Ok(configs)
    }

    async fn insert(&self, config: AdminConfig) -> Result<AdminConfig, AdminConfigError> {
        let result = self.inner.insert(config).await;
        self.invalidate();
        result
    }

    async fn update(&self, config: AdminConfig) -> Result<AdminConfig, AdminConfigError> {
        let result = self.inner.update(config).await;
        self.invalidate();
        result
    }

    async fn upsert(&self, config: AdminConfig) -> Result<AdminConfig, AdminConfigError> {
        let result = self.inner.upsert(config).await;
        self.invalidate();
        result
    }

    async fn delete(&self, config_name: &str) -> Result<(), AdminConfigError> {
        let result = self.inner.delete(config_name).await;
        self.invalidate();
        result
    }
}
