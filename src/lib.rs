//! mcpdock - MCP plugin catalog and agent config installer
//!
//! Syncs the MCP server catalog from a chain of registry sources and writes
//! plugin entries into coding-agent config files, tracking which agents have
//! which plugins installed.

pub mod config;
pub mod discovery;
pub mod install;
pub mod ledger;
pub mod logging;
pub mod mirrors;
pub mod models;
pub mod paths;
pub mod platform;
pub mod registry;
pub mod sources;
pub mod transform;

pub use config::StoreError;
pub use discovery::{add_persisted_agent, list_agents, remove_persisted_agent, AgentError};
pub use install::{InstallError, InstallOutcome, InstallStatus, Manager, MissingEnvVar, UninstallOutcome};
pub use models::{AgentDescriptor, AgentType, Catalog, EnvVarSpec, PluginRecord};
pub use paths::Paths;
pub use platform::{AgentKind, PlatformSchema};
pub use registry::RegistryStore;
pub use sources::{RegistrySource, SourceChain, SourceError};
pub use transform::transform;
