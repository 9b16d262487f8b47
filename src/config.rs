//! JSON config file read/write with backup-on-write.
//!
//! Reads never fail: a missing or unparseable file reads as `{}`. Comments and
//! trailing commas are accepted on read and dropped on the next write. Writes copy
//! the previous file to `<path>.bak.<epoch-ms>` (best effort) and then replace it
//! through a temp file + rename.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    /// File the failed write targeted.
    pub fn path(&self) -> &Path {
        match self {
            StoreError::CreateDir { path, .. }
            | StoreError::Serialize { path, .. }
            | StoreError::Write { path, .. } => path,
        }
    }
}

/// Read a JSON object from `path`. Missing, unreadable, malformed or non-object
/// content all read as an empty object.
pub async fn read_json(path: &Path) -> Value {
    Value::Object(read_object(path).await)
}

/// Same as [`read_json`] but returns the map directly.
pub async fn read_object(path: &Path) -> Map<String, Value> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Config not readable; treating as empty");
            return Map::new();
        }
    };

    match parse_lenient(&raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!(path = %path.display(), "Config is not a JSON object; treating as empty");
            Map::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Config is not valid JSON; treating as empty");
            Map::new()
        }
    }
}

/// Strict JSON first, then JSON5 for editor configs with comments or
/// trailing commas (Zed, VS Code, opencode).
fn parse_lenient(raw: &str) -> Result<Value, json5::Error> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Ok(value),
        Err(_) => json5::from_str::<Value>(raw),
    }
}

/// Write `doc` to `path` as pretty-printed JSON.
///
/// Creates the parent directory when needed. An existing file is copied to
/// `<path>.bak.<epoch-ms>` first; a failed backup is logged and does not block
/// the write.
pub async fn write_json(path: &Path, doc: &Value) -> Result<(), StoreError> {
    create_parent(path).await?;
    if fs::try_exists(path).await.unwrap_or(false) {
        backup(path).await;
    }
    write_atomic(path, doc).await
}

/// Like [`write_json`] but without the backup copy. For files mcpdock owns
/// and rewrites often, such as the registry cache.
pub async fn replace_json(path: &Path, doc: &Value) -> Result<(), StoreError> {
    create_parent(path).await?;
    write_atomic(path, doc).await
}

async fn create_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    Ok(())
}

/// Serialize to a `.tmp` sibling, then rename over `path`.
async fn write_atomic(path: &Path, doc: &Value) -> Result<(), StoreError> {
    let mut output = serde_json::to_string_pretty(doc).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    output.push('\n');

    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, output.as_bytes())
        .await
        .map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    if let Err(source) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StoreError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    debug!(path = %path.display(), "Wrote config");
    Ok(())
}

/// Backup path for a write happening at `epoch_ms`.
pub fn backup_path(path: &Path, epoch_ms: i64) -> PathBuf {
    sibling(path, &format!(".bak.{epoch_ms}"))
}

async fn backup(path: &Path) {
    let bak = backup_path(path, chrono::Utc::now().timestamp_millis());
    match fs::copy(path, &bak).await {
        Ok(_) => debug!(path = %path.display(), backup = %bak.display(), "Backed up config"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to back up config"),
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_and_malformed_files_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(read_json(&missing).await, json!({}));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert_eq!(read_json(&bad).await, json!({}));

        let array = dir.path().join("array.json");
        std::fs::write(&array, "[1, 2]").unwrap();
        assert_eq!(read_json(&array).await, json!({}));
    }

    #[tokio::test]
    async fn commented_settings_keep_their_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            "// Zed settings\n{\n  \"theme\": \"One Dark\", /* inline */\n  \"vim_mode\": true,\n}\n",
        )
        .unwrap();
        assert_eq!(
            read_json(&path).await,
            json!({"theme": "One Dark", "vim_mode": true})
        );
    }

    #[tokio::test]
    async fn replace_makes_no_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        for n in 0..3 {
            replace_json(&path, &json!({"n": n})).await.unwrap();
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(read_json(&path).await, json!({"n": 2}));
    }

    #[tokio::test]
    async fn write_creates_parent_and_pretty_prints() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/config.json");
        write_json(&path, &json!({"mcpServers": {}})).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  \"mcpServers\""));
        assert_eq!(read_json(&path).await, json!({"mcpServers": {}}));
    }

    #[tokio::test]
    async fn overwrite_leaves_backup_of_previous_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{\"old\": true}").unwrap();

        write_json(&path, &json!({"new": true})).await.unwrap();

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with("config.json.bak."))
            .collect();
        assert_eq!(backups.len(), 1);
        let bak = std::fs::read_to_string(dir.path().join(&backups[0])).unwrap();
        assert_eq!(bak, "{\"old\": true}");
        assert_eq!(read_json(&path).await, json!({"new": true}));
    }

    #[tokio::test]
    async fn first_write_makes_no_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        write_json(&path, &json!({})).await.unwrap();
        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn write_error_names_target_path() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let path = blocker.join("config.json");

        let err = write_json(&path, &json!({})).await.unwrap_err();
        assert_eq!(err.path(), blocker.as_path());
        assert!(err.to_string().contains(&blocker.display().to_string()));
    }

    #[test]
    fn backup_path_appends_timestamp() {
        let p = backup_path(Path::new("/x/mcp.json"), 1700000000123);
        assert_eq!(p, PathBuf::from("/x/mcp.json.bak.1700000000123"));
    }
}
