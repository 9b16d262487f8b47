//! Install and uninstall plugins into agent configs.
//!
//! [`Manager`] owns the registry store and resolves agents, and exposes the
//! operations callers use: catalog access, refresh, status, install,
//! uninstall and custom agent registration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::config::{self, StoreError};
use crate::discovery::{self, AgentError};
use crate::ledger;
use crate::mirrors::list_mirrors;
use crate::models::{AgentDescriptor, Catalog, EnvVarSpec};
use crate::paths::Paths;
use crate::platform::{has_entry, schema_for, SERVERS_KEY};
use crate::registry::RegistryStore;
use crate::sources::{build_http_client, SourceChain};

/// A required variable the caller did not supply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingEnvVar {
    pub name: String,
    #[serde(flatten)]
    pub spec: EnvVarSpec,
}

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),
    #[error("Agent {0} has no MCP config path")]
    NoConfigPath(String),
    #[error("No installation command available for {0}")]
    NotInstallable(String),
    #[error("Missing required environment variables for {plugin}: {}", names(.missing))]
    MissingEnv {
        plugin: String,
        missing: Vec<MissingEnvVar>,
    },
    #[error("Failed to update agent config {}: {source}", .path.display())]
    ConfigWrite { path: PathBuf, source: StoreError },
    #[error("Updated {} but failed to record it in the ledger: {source}", .path.display())]
    LedgerWrite { path: PathBuf, source: StoreError },
}

fn names(missing: &[MissingEnvVar]) -> String {
    missing
        .iter()
        .map(|m| m.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallStatus {
    pub agent_id: String,
    pub plugin_id: String,
    pub config_path: PathBuf,
    /// The agent config has an entry for the plugin.
    pub installed: bool,
    /// The ledger lists the agent for the plugin.
    pub tracked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallOutcome {
    pub agent_id: String,
    pub plugin_id: String,
    pub config_path: PathBuf,
    /// False when the config already had an identical entry.
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UninstallOutcome {
    Removed { config_path: PathBuf },
    NotFound { config_path: PathBuf },
}

impl UninstallOutcome {
    pub fn config_path(&self) -> &Path {
        match self {
            UninstallOutcome::Removed { config_path } | UninstallOutcome::NotFound { config_path } => {
                config_path
            }
        }
    }
}

pub struct Manager {
    paths: Paths,
    registry: RegistryStore,
}

impl Manager {
    pub fn new(paths: Paths, registry: RegistryStore) -> Self {
        Self { paths, registry }
    }

    /// Manager with the standard source chain for `paths`. Mirrors come from
    /// `MCPDOCK_MIRRORS` followed by `mirrors.list`; with neither set the chain
    /// is registry then cache.
    pub async fn open(paths: Paths) -> Result<Self, reqwest::Error> {
        let client = build_http_client()?;
        let mut mirrors = paths.env_mirrors.clone();
        for url in list_mirrors(paths.mirrors_path()).await {
            if !mirrors.contains(&url) {
                mirrors.push(url);
            }
        }
        let chain =
            SourceChain::standard(client, &paths.registry_url, &mirrors, paths.registry_cache());
        let registry = RegistryStore::new(paths.registry_cache(), chain);
        Ok(Self::new(paths, registry))
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    /// Cached catalog, refreshed first when the cache is empty.
    pub async fn get_catalog(&self) -> Result<Catalog, StoreError> {
        let catalog = self.registry.load().await;
        if catalog.is_empty() {
            return self.registry.refresh().await;
        }
        Ok(catalog)
    }

    pub async fn refresh_catalog(&self) -> Result<Catalog, StoreError> {
        self.registry.refresh().await
    }

    pub async fn list_agents(&self) -> Vec<AgentDescriptor> {
        discovery::list_agents(&self.paths).await
    }

    pub async fn add_persisted_agent(
        &self,
        name: &str,
        config_path: &str,
    ) -> Result<AgentDescriptor, AgentError> {
        discovery::add_persisted_agent(&self.paths, name, config_path).await
    }

    pub async fn remove_persisted_agent(&self, agent_id: &str) -> Result<(), AgentError> {
        discovery::remove_persisted_agent(&self.paths, agent_id).await
    }

    pub async fn get_install_status(
        &self,
        agent_id: &str,
        plugin_id: &str,
    ) -> Result<InstallStatus, InstallError> {
        let (agent, config_path) = self.resolve_agent(agent_id).await?;
        let schema = schema_for(&agent.id);
        let config = schema.ensure_schema(config::read_json(&config_path).await);
        let catalog = self.registry.load().await;

        Ok(InstallStatus {
            agent_id: agent.id,
            plugin_id: plugin_id.to_string(),
            installed: has_entry(&config, plugin_id),
            tracked: ledger::is_tracked(&catalog, plugin_id, agent_id),
            config_path,
        })
    }

    /// Write the plugin into the agent's config and record it in the ledger.
    ///
    /// Validation happens before any file is touched. The ledger is only
    /// updated once the config write succeeded.
    pub async fn install(
        &self,
        agent_id: &str,
        plugin_id: &str,
        env_vars: &BTreeMap<String, String>,
    ) -> Result<InstallOutcome, InstallError> {
        let (agent, config_path) = self.resolve_agent(agent_id).await?;
        let catalog = self.registry.load().await;
        let plugin = catalog
            .get(plugin_id)
            .ok_or_else(|| InstallError::PluginNotFound(plugin_id.to_string()))?;
        let command = plugin
            .command
            .as_deref()
            .filter(|_| plugin.is_installable())
            .ok_or_else(|| InstallError::NotInstallable(plugin_id.to_string()))?;

        let missing = missing_required(&plugin.env, env_vars);
        if !missing.is_empty() {
            return Err(InstallError::MissingEnv {
                plugin: plugin_id.to_string(),
                missing,
            });
        }

        let env: BTreeMap<String, String> = env_vars
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let schema = schema_for(&agent.id);
        let before = schema.ensure_schema(config::read_json(&config_path).await);
        let after = schema.set_entry(before.clone(), plugin_id, command, &env);
        let changed = before.get(SERVERS_KEY).and_then(|s| s.get(plugin_id))
            != after.get(SERVERS_KEY).and_then(|s| s.get(plugin_id));

        if changed {
            config::write_json(&config_path, &schema.to_native(after))
                .await
                .map_err(|source| InstallError::ConfigWrite {
                    path: config_path.clone(),
                    source,
                })?;
        }

        self.registry
            .record_install(plugin_id, &agent.id)
            .await
            .map_err(|source| InstallError::LedgerWrite {
                path: config_path.clone(),
                source,
            })?;

        info!(
            agent = %agent.id,
            plugin = %plugin_id,
            path = %config_path.display(),
            changed,
            "Installed plugin"
        );
        Ok(InstallOutcome {
            agent_id: agent.id,
            plugin_id: plugin_id.to_string(),
            config_path,
            changed,
        })
    }

    /// Remove the plugin from the agent's config. Absent entries report
    /// [`UninstallOutcome::NotFound`] and leave both the config and the ledger
    /// untouched.
    pub async fn uninstall(
        &self,
        agent_id: &str,
        plugin_id: &str,
    ) -> Result<UninstallOutcome, InstallError> {
        let (agent, config_path) = self.resolve_agent(agent_id).await?;
        let schema = schema_for(&agent.id);
        let config = schema.ensure_schema(config::read_json(&config_path).await);

        let (config, removed) = schema.remove_entry(config, plugin_id);
        if !removed {
            return Ok(UninstallOutcome::NotFound { config_path });
        }

        config::write_json(&config_path, &schema.to_native(config))
            .await
            .map_err(|source| InstallError::ConfigWrite {
                path: config_path.clone(),
                source,
            })?;

        self.registry
            .record_uninstall(plugin_id, &agent.id)
            .await
            .map_err(|source| InstallError::LedgerWrite {
                path: config_path.clone(),
                source,
            })?;

        info!(
            agent = %agent.id,
            plugin = %plugin_id,
            path = %config_path.display(),
            "Uninstalled plugin"
        );
        Ok(UninstallOutcome::Removed { config_path })
    }

    async fn resolve_agent(
        &self,
        agent_id: &str,
    ) -> Result<(AgentDescriptor, PathBuf), InstallError> {
        let agent = discovery::find_agent(&self.paths, agent_id)
            .await
            .ok_or_else(|| InstallError::AgentNotFound(agent_id.to_string()))?;
        let path = agent
            .mcp_config_path
            .clone()
            .ok_or_else(|| InstallError::NoConfigPath(agent_id.to_string()))?;
        Ok((agent, path))
    }
}

/// Required variables with no non-blank value in `supplied`, in name order.
pub fn missing_required(
    declared: &BTreeMap<String, EnvVarSpec>,
    supplied: &BTreeMap<String, String>,
) -> Vec<MissingEnvVar> {
    declared
        .iter()
        .filter(|(_, spec)| spec.required)
        .filter(|(name, _)| supplied.get(*name).map_or(true, |v| v.trim().is_empty()))
        .map(|(name, spec)| MissingEnvVar {
            name: name.clone(),
            spec: spec.clone(),
        })
        .collect()
}
