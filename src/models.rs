//! Data structures for the catalog, agents and persisted files.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry catalog, persisted as `{"mcps": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub mcps: Vec<PluginRecord>,
}

impl Catalog {
    pub fn new(mcps: Vec<PluginRecord>) -> Self {
        Self { mcps }
    }

    pub fn is_empty(&self) -> bool {
        self.mcps.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PluginRecord> {
        self.mcps.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PluginRecord> {
        self.mcps.iter_mut().find(|p| p.id == id)
    }

    /// Parse a catalog leniently: records that fail to deserialize are skipped.
    /// Returns `None` when `mcps` is missing or not an array.
    pub fn from_value_lenient(value: &serde_json::Value) -> Option<Self> {
        let items = value.get("mcps")?.as_array()?;
        let mcps = items
            .iter()
            .filter_map(|item| match serde_json::from_value::<PluginRecord>(item.clone()) {
                Ok(record) if !record.id.trim().is_empty() => Some(record),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed catalog record");
                    None
                }
            })
            .collect();
        Some(Self { mcps })
    }
}

/// One catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    /// Shell invocation that launches the server. `None` when no installable
    /// package was resolved.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, EnvVarSpec>,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub installation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub installed_agents: BTreeSet<String>,
}

impl PluginRecord {
    pub fn is_installable(&self) -> bool {
        self.command
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }

    /// Required variables, in name order.
    pub fn required_env(&self) -> impl Iterator<Item = (&String, &EnvVarSpec)> {
        self.env.iter().filter(|(_, spec)| spec.required)
    }
}

/// Declared environment variable for a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarSpec {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub secret: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Detected,
    Persisted,
}

/// A coding agent that can launch MCP servers from a JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    pub mcp_config_path: Option<PathBuf>,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    #[serde(default)]
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_parse_skips_bad_records() {
        let value = json!({
            "mcps": [
                {"id": "ok", "name": "Ok", "command": "npx ok"},
                {"name": "no id"},
                {"id": "", "name": "blank id"},
                {"id": "bad-env", "env": "nope"},
                {"id": "also-ok"}
            ]
        });
        let catalog = Catalog::from_value_lenient(&value).unwrap();
        let ids: Vec<_> = catalog.mcps.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["ok", "also-ok"]);
    }

    #[test]
    fn lenient_parse_rejects_wrong_shape() {
        assert!(Catalog::from_value_lenient(&json!({"servers": []})).is_none());
        assert!(Catalog::from_value_lenient(&json!({"mcps": {}})).is_none());
    }

    #[test]
    fn agent_descriptor_uses_camel_case_and_type_tag() {
        let agent = AgentDescriptor {
            id: "cursor".into(),
            name: "Cursor".into(),
            mcp_config_path: Some(PathBuf::from("/h/.cursor/mcp.json")),
            agent_type: AgentType::Detected,
            category: "ide".into(),
        };
        let v = serde_json::to_value(&agent).unwrap();
        assert_eq!(v["mcpConfigPath"], "/h/.cursor/mcp.json");
        assert_eq!(v["type"], "detected");
    }

    #[test]
    fn blank_command_is_not_installable() {
        let mut record = PluginRecord {
            id: "x".into(),
            command: Some("  ".into()),
            ..Default::default()
        };
        assert!(!record.is_installable());
        record.command = Some("npx x".into());
        assert!(record.is_installable());
    }
}
