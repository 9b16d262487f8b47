//! Registry sources and the fallback chain.
//!
//! Each tier produces a [`Catalog`]. The chain tries them in order and takes
//! the first non-empty result: the authoritative registry, then each mirror,
//! then the local cache. If every tier fails the chain yields an empty catalog.

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::Catalog;
use crate::transform::{is_active, transform};

pub const PAGE_SIZE: usize = 100;

/// Upper bound on records pulled from the authoritative registry per refresh.
pub const MAX_RECORDS: usize = 5000;

const USER_AGENT: &str = concat!("mcpdock/", env!("CARGO_PKG_VERSION"));

pub fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(30))
        .build()
}

/// How a tier relates to the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Fetched data; persisted to the cache on success.
    Remote,
    /// The cache itself.
    Cache,
}

#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    async fn fetch(&self) -> Result<Catalog, SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to fetch {url}: {}", chain(.cause))]
    Http { url: String, cause: reqwest::Error },
    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
    #[error("Failed to read cache {}: {cause}", .path.display())]
    CacheRead {
        path: PathBuf,
        cause: std::io::Error,
    },
    #[error("Malformed cache {}: {reason}", .path.display())]
    CacheMalformed { path: PathBuf, reason: String },
    #[error("{0} returned no records")]
    Empty(String),
}

/// Render an error with its source chain on one line.
fn chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        out.push_str(": ");
        out.push_str(&s.to_string());
        source = s.source();
    }
    out
}

/// Which tier produced a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Source { name: String, kind: SourceKind },
    /// Every tier failed.
    Fallback,
}

impl Origin {
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Origin::Source {
                kind: SourceKind::Remote,
                ..
            }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub catalog: Catalog,
    pub origin: Origin,
}

/// Ordered fallback over registry sources.
pub struct SourceChain {
    sources: Vec<Box<dyn RegistrySource>>,
}

impl SourceChain {
    pub fn new(sources: Vec<Box<dyn RegistrySource>>) -> Self {
        Self { sources }
    }

    /// Standard chain: authoritative registry, each mirror, the cache file.
    pub fn standard(
        client: reqwest::Client,
        registry_url: &str,
        mirrors: &[String],
        cache: PathBuf,
    ) -> Self {
        let mut sources: Vec<Box<dyn RegistrySource>> =
            vec![Box::new(OfficialRegistry::new(client.clone(), registry_url))];
        for url in mirrors {
            sources.push(Box::new(MirrorSource::new(client.clone(), url)));
        }
        sources.push(Box::new(CacheSource::new(cache)));
        Self::new(sources)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Try each source in order. Never fails.
    pub async fn resolve(&self) -> Resolved {
        for (position, source) in self.sources.iter().enumerate() {
            let result = match source.fetch().await {
                Ok(catalog) if catalog.is_empty() => {
                    Err(SourceError::Empty(source.name().to_string()))
                }
                other => other,
            };
            match result {
                Ok(catalog) => {
                    info!(
                        source = source.name(),
                        records = catalog.mcps.len(),
                        "Resolved registry catalog"
                    );
                    return Resolved {
                        catalog,
                        origin: Origin::Source {
                            name: source.name().to_string(),
                            kind: source.kind(),
                        },
                    };
                }
                Err(e) if position == 0 || matches!(e, SourceError::CacheMalformed { .. }) => {
                    warn!(source = source.name(), error = %e, "Registry source failed")
                }
                Err(e) => debug!(source = source.name(), error = %e, "Registry source failed"),
            }
        }

        warn!("All registry sources failed; serving empty catalog");
        Resolved {
            catalog: Catalog::default(),
            origin: Origin::Fallback,
        }
    }
}

/// Paginated authoritative registry (`GET {base}/v0/servers?limit=&cursor=`).
pub struct OfficialRegistry {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
    max_records: usize,
}

impl OfficialRegistry {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: PAGE_SIZE,
            max_records: MAX_RECORDS,
        }
    }

    pub fn with_limits(mut self, page_size: usize, max_records: usize) -> Self {
        self.page_size = page_size.max(1);
        self.max_records = max_records;
        self
    }

    fn servers_url(&self) -> String {
        format!("{}/v0/servers", self.base_url)
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Value, SourceError> {
        let url = self.servers_url();
        let limit = self.page_size.to_string();
        let mut query = vec![("limit", limit.as_str())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }

        let http_err = |cause| SourceError::Http {
            url: url.clone(),
            cause,
        };
        let resp = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?;
        resp.json::<Value>().await.map_err(http_err)
    }
}

#[async_trait]
impl RegistrySource for OfficialRegistry {
    fn name(&self) -> &str {
        "registry"
    }

    async fn fetch(&self) -> Result<Catalog, SourceError> {
        let mut records = Vec::new();
        let mut seen = 0usize;
        let mut cursor: Option<String> = None;

        loop {
            let page = self.fetch_page(cursor.as_deref()).await?;
            let servers = page
                .get("servers")
                .and_then(Value::as_array)
                .ok_or_else(|| SourceError::Malformed {
                    url: self.servers_url(),
                    reason: "missing servers array".to_string(),
                })?;

            let remaining = self.max_records.saturating_sub(seen);
            seen += servers.len().min(remaining);
            records.extend(
                servers
                    .iter()
                    .take(remaining)
                    .filter(|raw| is_active(raw))
                    .filter_map(transform),
            );
            debug!(page_records = servers.len(), total = records.len(), "Fetched registry page");

            cursor = next_cursor(&page);
            if cursor.is_none() || servers.is_empty() {
                break;
            }
            if seen >= self.max_records {
                warn!(
                    max_records = self.max_records,
                    "Registry record cap reached; stopping pagination"
                );
                break;
            }
        }

        dedupe_by_id(&mut records);
        Ok(Catalog::new(records))
    }
}

fn next_cursor(page: &Value) -> Option<String> {
    let metadata = page.get("metadata")?;
    ["nextCursor", "next_cursor"]
        .iter()
        .find_map(|k| metadata.get(*k).and_then(Value::as_str))
        .filter(|c| !c.is_empty())
        .map(String::from)
}

/// Keep the first record for each id.
fn dedupe_by_id(records: &mut Vec<crate::models::PluginRecord>) {
    let mut seen = std::collections::HashSet::new();
    records.retain(|r| seen.insert(r.id.clone()));
}

/// Flat mirror file already in catalog shape (`{"mcps": [...]}`).
pub struct MirrorSource {
    client: reqwest::Client,
    url: String,
}

impl MirrorSource {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl RegistrySource for MirrorSource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Catalog, SourceError> {
        let http_err = |cause| SourceError::Http {
            url: self.url.clone(),
            cause,
        };
        let body: Value = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?
            .json()
            .await
            .map_err(http_err)?;

        let mut catalog = Catalog::from_value_lenient(&body).ok_or_else(|| SourceError::Malformed {
            url: self.url.clone(),
            reason: "missing mcps array".to_string(),
        })?;
        dedupe_by_id(&mut catalog.mcps);
        Ok(catalog)
    }
}

/// The local registry cache file.
pub struct CacheSource {
    path: PathBuf,
}

impl CacheSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl RegistrySource for CacheSource {
    fn name(&self) -> &str {
        "cache"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Cache
    }

    async fn fetch(&self) -> Result<Catalog, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|cause| SourceError::CacheRead {
                path: self.path.clone(),
                cause,
            })?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| SourceError::CacheMalformed {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Catalog::from_value_lenient(&value).ok_or_else(|| SourceError::CacheMalformed {
            path: self.path.clone(),
            reason: "missing mcps array".to_string(),
        })
    }
}
