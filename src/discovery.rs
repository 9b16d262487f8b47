//! Agent discovery: well-known agents found under the home dir, plus agents
//! the user registered by hand.
//!
//! Detected agents are recomputed on every call. Persisted agents live in
//! `agents.json` (`agentId -> AgentDescriptor`) until removed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{self, StoreError};
use crate::models::{AgentDescriptor, AgentType};
use crate::paths::{expand_tilde, Paths};

/// Well-known agent: id, display name, category, config path relative to home.
struct KnownAgent {
    id: &'static str,
    name: &'static str,
    category: &'static str,
    config: &'static str,
}

#[cfg(target_os = "macos")]
const CLAUDE_DESKTOP_CONFIG: &str = "Library/Application Support/Claude/claude_desktop_config.json";
#[cfg(target_os = "windows")]
const CLAUDE_DESKTOP_CONFIG: &str = "AppData/Roaming/Claude/claude_desktop_config.json";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CLAUDE_DESKTOP_CONFIG: &str = ".config/Claude/claude_desktop_config.json";

#[cfg(target_os = "macos")]
const VSCODE_CONFIG: &str = "Library/Application Support/Code/User/mcp.json";
#[cfg(target_os = "windows")]
const VSCODE_CONFIG: &str = "AppData/Roaming/Code/User/mcp.json";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const VSCODE_CONFIG: &str = ".config/Code/User/mcp.json";

const KNOWN_AGENTS: &[KnownAgent] = &[
    KnownAgent {
        id: "claude-desktop",
        name: "Claude Desktop",
        category: "desktop",
        config: CLAUDE_DESKTOP_CONFIG,
    },
    KnownAgent {
        id: "claude-code",
        name: "Claude Code",
        category: "cli",
        config: ".claude.json",
    },
    KnownAgent {
        id: "cursor",
        name: "Cursor",
        category: "ide",
        config: ".cursor/mcp.json",
    },
    KnownAgent {
        id: "windsurf",
        name: "Windsurf",
        category: "ide",
        config: ".codeium/windsurf/mcp_config.json",
    },
    KnownAgent {
        id: "vscode",
        name: "VS Code",
        category: "ide",
        config: VSCODE_CONFIG,
    },
    KnownAgent {
        id: "zed",
        name: "Zed",
        category: "ide",
        config: ".config/zed/settings.json",
    },
    KnownAgent {
        id: "opencode",
        name: "opencode",
        category: "cli",
        config: ".config/opencode/opencode.json",
    },
    KnownAgent {
        id: "gemini-cli",
        name: "Gemini CLI",
        category: "cli",
        config: ".gemini/settings.json",
    },
];

const PERSISTED_CATEGORY: &str = "custom";

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent name {0:?} does not yield a usable id")]
    InvalidName(String),
    #[error("Agent config path must be absolute: {}", .0.display())]
    RelativePath(PathBuf),
    #[error("Agent already exists: {0}")]
    AlreadyExists(String),
    #[error("Agent not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Detected agents under `home`. An agent counts as detected when its config
/// file or the directory that would hold it exists.
pub fn detect_agents(home: &Path) -> Vec<AgentDescriptor> {
    KNOWN_AGENTS
        .iter()
        .filter_map(|known| {
            let path = home.join(known.config);
            let present = path.exists() || path.parent().is_some_and(|p| p != home && p.exists());
            if !present {
                return None;
            }
            debug!(agent = known.id, path = %path.display(), "Detected agent");
            Some(AgentDescriptor {
                id: known.id.to_string(),
                name: known.name.to_string(),
                mcp_config_path: Some(path),
                agent_type: AgentType::Detected,
                category: known.category.to_string(),
            })
        })
        .collect()
}

/// Agents stored in `agents.json`.
pub async fn load_persisted(path: &Path) -> BTreeMap<String, AgentDescriptor> {
    config::read_object(path)
        .await
        .into_iter()
        .filter_map(|(id, value)| match serde_json::from_value::<AgentDescriptor>(value) {
            Ok(mut agent) => {
                agent.id = id.clone();
                agent.agent_type = AgentType::Persisted;
                Some((id, agent))
            }
            Err(e) => {
                debug!(agent = %id, error = %e, "Skipping malformed persisted agent");
                None
            }
        })
        .collect()
}

async fn save_persisted(
    path: &Path,
    agents: &BTreeMap<String, AgentDescriptor>,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(agents).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    config::replace_json(path, &value).await
}

/// Detected agents merged with persisted ones, sorted by id. A persisted agent
/// replaces a detected one with the same id.
pub async fn list_agents(paths: &Paths) -> Vec<AgentDescriptor> {
    let mut merged: BTreeMap<String, AgentDescriptor> = detect_agents(paths.home())
        .into_iter()
        .map(|a| (a.id.clone(), a))
        .collect();
    merged.extend(load_persisted(&paths.agents_file()).await);
    merged.into_values().collect()
}

pub async fn find_agent(paths: &Paths, agent_id: &str) -> Option<AgentDescriptor> {
    list_agents(paths).await.into_iter().find(|a| a.id == agent_id)
}

/// Register a custom agent. The id is derived from `name`; `config_path` may
/// start with `~` but must otherwise be absolute.
pub async fn add_persisted_agent(
    paths: &Paths,
    name: &str,
    config_path: &str,
) -> Result<AgentDescriptor, AgentError> {
    let name = name.trim();
    let id = slugify(name);
    if id.is_empty() {
        return Err(AgentError::InvalidName(name.to_string()));
    }
    let config_path = expand_tilde(config_path.trim());
    if !config_path.is_absolute() {
        return Err(AgentError::RelativePath(config_path));
    }

    let file = paths.agents_file();
    let mut agents = load_persisted(&file).await;
    if agents.contains_key(&id) {
        return Err(AgentError::AlreadyExists(id));
    }

    let agent = AgentDescriptor {
        id: id.clone(),
        name: name.to_string(),
        mcp_config_path: Some(config_path),
        agent_type: AgentType::Persisted,
        category: PERSISTED_CATEGORY.to_string(),
    };
    agents.insert(id, agent.clone());
    save_persisted(&file, &agents).await?;
    Ok(agent)
}

pub async fn remove_persisted_agent(paths: &Paths, agent_id: &str) -> Result<(), AgentError> {
    let file = paths.agents_file();
    let mut agents = load_persisted(&file).await;
    if agents.remove(agent_id).is_none() {
        return Err(AgentError::NotFound(agent_id.to_string()));
    }
    save_persisted(&file, &agents).await?;
    Ok(())
}

/// Lowercase ASCII alphanumerics, everything else collapsed to single dashes.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> Paths {
        Paths::rooted(dir.path(), "http://127.0.0.1:9")
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("My Agent (beta)!"), "my-agent-beta");
        assert_eq!(slugify("  --  "), "");
        assert_eq!(slugify("Zed"), "zed");
    }

    #[tokio::test]
    async fn detects_only_present_agents() {
        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        std::fs::create_dir_all(p.home().join(".cursor")).unwrap();
        std::fs::create_dir_all(p.home()).unwrap();
        std::fs::write(p.home().join(".claude.json"), "{}").unwrap();

        let agents = list_agents(&p).await;
        let ids: Vec<_> = agents.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["claude-code", "cursor"]);
        assert!(agents.iter().all(|a| a.agent_type == AgentType::Detected));
        assert_eq!(
            agents[1].mcp_config_path.as_deref(),
            Some(p.home().join(".cursor/mcp.json").as_path())
        );
    }

    #[tokio::test]
    async fn persisted_agents_round_trip() {
        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        let target = dir.path().join("custom/mcp.json");

        let agent = add_persisted_agent(&p, "My Agent", target.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(agent.id, "my-agent");
        assert_eq!(agent.category, "custom");

        let dup = add_persisted_agent(&p, "my agent", target.to_str().unwrap()).await;
        assert!(matches!(dup, Err(AgentError::AlreadyExists(_))));

        let found = find_agent(&p, "my-agent").await.unwrap();
        assert_eq!(found.agent_type, AgentType::Persisted);
        assert_eq!(found.mcp_config_path.as_deref(), Some(target.as_path()));

        remove_persisted_agent(&p, "my-agent").await.unwrap();
        assert!(find_agent(&p, "my-agent").await.is_none());
        let again = remove_persisted_agent(&p, "my-agent").await;
        assert!(matches!(again, Err(AgentError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejects_relative_paths_and_empty_names() {
        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        let rel = add_persisted_agent(&p, "x", "relative/mcp.json").await;
        assert!(matches!(rel, Err(AgentError::RelativePath(_))));
        let empty = add_persisted_agent(&p, "!!!", "/abs/mcp.json").await;
        assert!(matches!(empty, Err(AgentError::InvalidName(_))));
        assert!(!p.agents_file().exists());
    }

    #[tokio::test]
    async fn persisted_agent_overrides_detected_id() {
        let dir = TempDir::new().unwrap();
        let p = paths(&dir);
        std::fs::create_dir_all(p.home().join(".cursor")).unwrap();
        add_persisted_agent(&p, "Cursor", "/opt/cursor/mcp.json").await.unwrap();

        let cursor = find_agent(&p, "cursor").await.unwrap();
        assert_eq!(cursor.agent_type, AgentType::Persisted);
        assert_eq!(
            cursor.mcp_config_path.as_deref(),
            Some(Path::new("/opt/cursor/mcp.json"))
        );
    }
}
