//! Asset listers: where the ordered asset collections come from.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use super::{AssetCategory, AssetItem};
use crate::error::{AssetError, ConfigError};

/// Source of asset collections.
///
/// Must return items in a stable order; paging relies on it.
#[async_trait]
pub trait AssetLister: Send + Sync {
    async fn list(&self, category: AssetCategory) -> Result<Vec<AssetItem>, AssetError>;
}

/// Fixed in-memory collections. Used for local manifests and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAssetLister {
    collections: HashMap<AssetCategory, Vec<AssetItem>>,
}

/// On-disk manifest layout: `{ "fonts": [...], "backgrounds": [...] }`.
#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    fonts: Vec<AssetItem>,
    #[serde(default)]
    backgrounds: Vec<AssetItem>,
}

impl StaticAssetLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: AssetCategory, items: Vec<AssetItem>) -> Self {
        self.collections.insert(category, items);
        self
    }

    /// Parse a JSON manifest.
    pub fn from_json(json: &str) -> Result<Self, AssetError> {
        let manifest: Manifest =
            serde_json::from_str(json).map_err(|e| AssetError::InvalidManifest(e.to_string()))?;
        Ok(Self::new()
            .with(AssetCategory::Font, manifest.fonts)
            .with(AssetCategory::Background, manifest.backgrounds))
    }

    /// Load a JSON manifest from disk.
    pub fn from_manifest_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| ConfigError::InvalidValue {
            key: "ORDER_BOT_ASSET_MANIFEST".into(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl AssetLister for StaticAssetLister {
    async fn list(&self, category: AssetCategory) -> Result<Vec<AssetItem>, AssetError> {
        Ok(self.collections.get(&category).cloned().unwrap_or_default())
    }
}

/// Lists assets from a static host: `GET {base}/{collection}.json` returns
/// a JSON array of `{ "id", "url" }`. Relative URLs resolve against the base.
pub struct HttpAssetLister {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpAssetLister {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| ConfigError::InvalidValue {
            key: "ORDER_BOT_ASSET_BASE_URL".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
        })
    }

    fn collection_url(&self, category: AssetCategory) -> Result<Url, AssetError> {
        self.base_url
            .join(&format!("{}.json", category.collection()))
            .map_err(|e| AssetError::ListFailed {
                category: category.to_string(),
                reason: e.to_string(),
            })
    }

    fn resolve(&self, item: AssetItem) -> AssetItem {
        match self.base_url.join(&item.url) {
            Ok(url) => AssetItem {
                id: item.id,
                url: url.to_string(),
            },
            Err(_) => item,
        }
    }
}

#[async_trait]
impl AssetLister for HttpAssetLister {
    async fn list(&self, category: AssetCategory) -> Result<Vec<AssetItem>, AssetError> {
        let url = self.collection_url(category)?;
        let failed = |reason: String| AssetError::ListFailed {
            category: category.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(failed(format!("{url} returned {}", resp.status())));
        }

        let items: Vec<AssetItem> = resp.json().await.map_err(|e| failed(e.to_string()))?;
        tracing::debug!(category = %category, count = items.len(), "Listed assets");
        Ok(items.into_iter().map(|i| self.resolve(i)).collect())
    }
}
