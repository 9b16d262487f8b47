//! Local registry cache: load, refresh and ledger persistence.
//!
//! The cache file holds the whole catalog including installation state.
//! Refreshes replace it wholesale after carrying installation state forward;
//! ledger updates rewrite it immediately. Concurrent writers are not
//! coordinated: the last read-modify-write wins.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::{self, StoreError};
use crate::ledger;
use crate::models::Catalog;
use crate::sources::{Origin, SourceChain};

/// Default interval between scheduled refreshes.
pub const REFRESH_PERIOD: Duration = Duration::from_secs(30 * 60);

pub struct RegistryStore {
    path: PathBuf,
    chain: SourceChain,
}

impl RegistryStore {
    pub fn new(path: PathBuf, chain: SourceChain) -> Self {
        Self { path, chain }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current cached catalog. Missing or malformed cache reads as empty.
    pub async fn load(&self) -> Catalog {
        let value = config::read_json(&self.path).await;
        let mut catalog = Catalog::from_value_lenient(&value).unwrap_or_default();
        ledger::reconcile_all(&mut catalog);
        catalog
    }

    pub async fn save(&self, catalog: &Catalog) -> Result<(), StoreError> {
        let value = serde_json::to_value(catalog).map_err(|source| StoreError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        config::replace_json(&self.path, &value).await
    }

    /// Run the source chain. A catalog from a remote tier replaces the cache
    /// after installation state is carried over from the previous cache.
    pub async fn refresh(&self) -> Result<Catalog, StoreError> {
        let resolved = self.chain.resolve().await;
        if !resolved.origin.is_remote() {
            if resolved.origin == Origin::Fallback {
                return Ok(Catalog::default());
            }
            let mut catalog = resolved.catalog;
            ledger::reconcile_all(&mut catalog);
            return Ok(catalog);
        }

        let previous = self.load().await;
        let mut catalog = resolved.catalog;
        let dropped = ledger::carry_forward(&previous, &mut catalog);
        for id in &dropped {
            warn!(plugin = %id, "Installed plugin no longer in registry; dropping its ledger entry");
        }

        self.save(&catalog).await?;
        info!(path = %self.path.display(), records = catalog.mcps.len(), "Registry cache updated");
        Ok(catalog)
    }

    /// Record `agent_id` as having `plugin_id` installed and persist.
    pub async fn record_install(&self, plugin_id: &str, agent_id: &str) -> Result<(), StoreError> {
        let mut catalog = self.load().await;
        if ledger::mark_installed(&mut catalog, plugin_id, agent_id, Utc::now()) {
            self.save(&catalog).await?;
        }
        Ok(())
    }

    /// Drop `agent_id` from `plugin_id`'s installed agents and persist.
    pub async fn record_uninstall(&self, plugin_id: &str, agent_id: &str) -> Result<(), StoreError> {
        let mut catalog = self.load().await;
        if ledger::mark_uninstalled(&mut catalog, plugin_id, agent_id) {
            self.save(&catalog).await?;
        }
        Ok(())
    }
}

/// Refresh on a fixed period until the task is dropped. The first refresh runs
/// immediately.
pub async fn run_periodic_refresh(store: &RegistryStore, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = store.refresh().await {
            warn!(error = %e, "Scheduled registry refresh failed");
        }
    }
}
