//! Secondary registry mirrors (`mirrors.list`).
//!
//! One URL per line; blank lines and `#` comments are ignored. Each URL becomes
//! a mirror tier in the source chain, in file order.

use std::path::{Path, PathBuf};

use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Invalid mirror URL: {0:?}")]
    InvalidUrl(String),
    #[error("Mirror already listed: {0}")]
    AlreadyExists(String),
    #[error("Mirror not listed: {0}")]
    NotFound(String),
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Mirror URLs in file order. A missing file means no mirrors.
pub async fn list_mirrors(path: &Path) -> Vec<String> {
    match fs::read_to_string(path).await {
        Ok(content) => parse_list(&content).map(String::from).collect(),
        Err(_) => vec![],
    }
}

/// Append a mirror URL. Creates the file and parent dir if needed.
pub async fn add_mirror(path: &Path, url: &str) -> Result<(), MirrorError> {
    let url = validate(url)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| MirrorError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let content = fs::read_to_string(path).await.unwrap_or_default();
    if parse_list(&content).any(|u| u == url) {
        return Err(MirrorError::AlreadyExists(url.to_string()));
    }

    let mut new_content = content.trim_end().to_string();
    if !new_content.is_empty() {
        new_content.push('\n');
    }
    new_content.push_str(url);
    new_content.push('\n');

    fs::write(path, new_content)
        .await
        .map_err(|source| MirrorError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

/// Remove a mirror URL, keeping comments and the other lines intact.
pub async fn remove_mirror(path: &Path, url: &str) -> Result<(), MirrorError> {
    let url = validate(url)?;
    let content = fs::read_to_string(path).await.unwrap_or_default();
    if !parse_list(&content).any(|u| u == url) {
        return Err(MirrorError::NotFound(url.to_string()));
    }

    let mut new_content = content
        .lines()
        .filter(|l| l.trim() != url)
        .collect::<Vec<_>>()
        .join("\n");
    if !new_content.is_empty() {
        new_content.push('\n');
    }

    fs::write(path, new_content)
        .await
        .map_err(|source| MirrorError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

fn validate(url: &str) -> Result<&str, MirrorError> {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url)
    } else {
        Err(MirrorError::InvalidUrl(url.to_string()))
    }
}

fn parse_list(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn add_list_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg/mirrors.list");
        assert!(list_mirrors(&path).await.is_empty());

        add_mirror(&path, "https://a.example/mcps.json").await.unwrap();
        add_mirror(&path, " https://b.example/mcps.json ").await.unwrap();
        assert_eq!(
            list_mirrors(&path).await,
            vec!["https://a.example/mcps.json", "https://b.example/mcps.json"]
        );

        let dup = add_mirror(&path, "https://a.example/mcps.json").await;
        assert!(matches!(dup, Err(MirrorError::AlreadyExists(_))));

        remove_mirror(&path, "https://a.example/mcps.json").await.unwrap();
        assert_eq!(list_mirrors(&path).await, vec!["https://b.example/mcps.json"]);

        let gone = remove_mirror(&path, "https://a.example/mcps.json").await;
        assert!(matches!(gone, Err(MirrorError::NotFound(_))));
    }

    #[tokio::test]
    async fn comments_survive_and_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mirrors.list");
        std::fs::write(&path, "# primary mirror\nhttps://a.example/x.json\n\n").unwrap();

        assert_eq!(list_mirrors(&path).await, vec!["https://a.example/x.json"]);
        add_mirror(&path, "https://b.example/y.json").await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("# primary mirror\n"));
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mirrors.list");
        let err = add_mirror(&path, "ftp://nope").await;
        assert!(matches!(err, Err(MirrorError::InvalidUrl(_))));
        assert!(!path.exists());
    }
}
