//! Path and endpoint resolution.
//!
//! Uses env vars when set, otherwise `dirs` defaults.

use std::path::{Path, PathBuf};

/// Default authoritative registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.modelcontextprotocol.io";

/// Resolved locations for mcpdock state.
#[derive(Debug, Clone)]
pub struct Paths {
    pub home: PathBuf,
    pub data_dir: PathBuf,
    pub mirrors: PathBuf,
    pub registry_url: String,
    /// Mirror URLs from `MCPDOCK_MIRRORS`, tried before those in `mirrors.list`.
    pub env_mirrors: Vec<String>,
}

impl Paths {
    /// Resolve paths from environment, falling back to XDG/defaults.
    pub fn resolve() -> Self {
        let home = resolve_path("MCPDOCK_HOME", dirs::home_dir(), "~");
        let data_dir = resolve_path(
            "MCPDOCK_DATA_DIR",
            dirs::data_local_dir().map(|p| p.join("mcpdock")),
            "~/.local/share/mcpdock",
        );
        let mirrors = resolve_path(
            "MCPDOCK_MIRRORS_PATH",
            dirs::config_dir().map(|p| p.join("mcpdock/mirrors.list")),
            "~/.config/mcpdock/mirrors.list",
        );
        let registry_url = std::env::var("MCPDOCK_REGISTRY_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string());
        let env_mirrors = std::env::var("MCPDOCK_MIRRORS")
            .map(|v| split_mirror_urls(&v))
            .unwrap_or_default();

        Self {
            home,
            data_dir,
            mirrors,
            registry_url,
            env_mirrors,
        }
    }

    /// Paths rooted under a single directory. Used by tests and embedders
    /// that want isolated state.
    pub fn rooted(root: &Path, registry_url: &str) -> Self {
        Self {
            home: root.join("home"),
            data_dir: root.join("data"),
            mirrors: root.join("config/mirrors.list"),
            registry_url: registry_url.trim_end_matches('/').to_string(),
            env_mirrors: vec![],
        }
    }

    /// Home directory used to locate well-known agent configs.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Local registry cache (`{"mcps": [...]}`).
    pub fn registry_cache(&self) -> PathBuf {
        self.data_dir.join("registry.json")
    }

    /// Persisted custom agents (`agentId -> AgentDescriptor`).
    pub fn agents_file(&self) -> PathBuf {
        self.data_dir.join("agents.json")
    }

    /// Mirror URL list.
    pub fn mirrors_path(&self) -> &Path {
        &self.mirrors
    }
}

fn resolve_path(env_var: &str, default: Option<PathBuf>, fallback: &str) -> PathBuf {
    if let Ok(val) = std::env::var(env_var) {
        let trimmed = val.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }
    default.unwrap_or_else(|| expand_tilde(fallback))
}

/// Split a comma or whitespace separated URL list.
fn split_mirror_urls(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|u| !u.is_empty())
        .map(String::from)
        .collect()
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_paths_live_under_root() {
        let root = Path::new("/tmp/mcpdock-test");
        let paths = Paths::rooted(root, "http://127.0.0.1:9/");
        assert_eq!(paths.registry_cache(), root.join("data/registry.json"));
        assert_eq!(paths.agents_file(), root.join("data/agents.json"));
        assert_eq!(paths.home(), root.join("home"));
        assert_eq!(paths.registry_url, "http://127.0.0.1:9");
    }

    #[test]
    fn mirror_env_accepts_commas_and_spaces() {
        assert_eq!(
            split_mirror_urls(" https://a.example/m.json, https://b.example/m.json\nhttps://c.example "),
            vec!["https://a.example/m.json", "https://b.example/m.json", "https://c.example"]
        );
        assert!(split_mirror_urls(" , ").is_empty());
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths_alone() {
        assert_eq!(expand_tilde("/etc/x.json"), PathBuf::from("/etc/x.json"));
    }
}
