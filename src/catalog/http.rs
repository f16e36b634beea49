// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP-backed catalog client.
//!
//! One client type serves both trainer catalogs (Fling and XiaoXing); they
//! differ only in base URL and index cache file. The client keeps a local
//! copy of the catalog index on disk so update checks work between
//! refreshes and at startup before any network traffic happened.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use futures_util::StreamExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::{base_name, parse_version, version_newer, CatalogEntry, TrainerSource, TrainerUpdate};
use crate::error::TrainerError;

const USER_AGENT: &str = concat!("trainerhub/", env!("CARGO_PKG_VERSION"));

/// One row of the cached catalog index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    pub download_url: String,
}

/// Reqwest-backed [`TrainerSource`].
pub struct HttpCatalog {
    name: String,
    base_url: String,
    index_path: PathBuf,
    client: reqwest::Client,
    index: RwLock<Vec<IndexEntry>>,
}

impl HttpCatalog {
    /// The Fling catalog against the configured download server.
    pub fn fling(server: &str, data_dir: &Path) -> Self {
        let base_url = match server {
            "china" => "https://dl.flingtrainer.com".to_string(),
            _ => "https://flingtrainer.com".to_string(),
        };
        Self::new("fling", base_url, data_dir.join("fling-index.json"))
    }

    /// The XiaoXing catalog.
    pub fn xiaoxing(data_dir: &Path) -> Self {
        Self::new(
            "xiaoxing",
            "https://www.xiaoxingjie.com".to_string(),
            data_dir.join("xiaoxing-index.json"),
        )
    }

    pub fn new(name: &str, base_url: String, index_path: PathBuf) -> Self {
        let index = load_cached_index(&index_path);
        Self {
            name: name.to_string(),
            base_url,
            index_path,
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
            index: RwLock::new(index),
        }
    }

    fn lookup(&self, trainer_name: &str) -> Option<IndexEntry> {
        let wanted = base_name(trainer_name).to_lowercase();
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        index
            .iter()
            .find(|entry| base_name(&entry.name).to_lowercase() == wanted)
            .cloned()
    }
}

#[async_trait]
impl TrainerSource for HttpCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, keyword: &str) -> Result<Vec<CatalogEntry>, TrainerError> {
        let url = format!("{}/api/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("keyword", keyword)])
            .send()
            .await?
            .error_for_status()?;
        let entries: Vec<CatalogEntry> = response.json().await?;
        Ok(entries)
    }

    async fn resolve_download_url(&self, entry: &CatalogEntry) -> Result<String, TrainerError> {
        // Direct hit against the cached index first; the detail page is
        // only consulted when the index does not know the trainer.
        if let Some(indexed) = self.lookup(&entry.name) {
            return Ok(indexed.download_url);
        }

        let detail_url = entry.detail_url.as_ref().ok_or_else(|| {
            TrainerError::Network(format!(
                "no download source known for {}; refresh the {} catalog and retry",
                entry.name, self.name
            ))
        })?;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct DetailResponse {
            download_url: String,
        }

        let response = self
            .client
            .get(detail_url)
            .send()
            .await?
            .error_for_status()?;
        let detail: DetailResponse = response.json().await?;
        Ok(detail.download_url)
    }

    async fn fetch_archive(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, TrainerError> {
        fs::create_dir_all(dest_dir)?;

        let file_name = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("trainer.zip");
        let dest = dest_dir.join(file_name);

        let response = self.client.get(url).send().await?.error_for_status()?;
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(&dest).await?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(dest)
    }

    async fn refresh_index(&self) -> Result<usize, TrainerError> {
        let url = format!("{}/api/trainers", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let entries: Vec<IndexEntry> = response.json().await?;

        if let Some(parent) = self.index_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&entries)
            .map_err(|e| TrainerError::Network(e.to_string()))?;
        fs::write(&self.index_path, json)?;

        let count = entries.len();
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = entries;
        tracing::info!(catalog = %self.name, entries = count, "catalog index refreshed");
        Ok(count)
    }

    async fn fetch_translations(&self, data_dir: &Path) -> Result<u64, TrainerError> {
        let url = format!("{}/api/xgqdetail.json", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body = response.bytes().await?;

        fs::create_dir_all(data_dir)?;
        let dest = data_dir.join("xgqdetail.json");
        fs::write(&dest, &body)?;
        Ok(body.len() as u64)
    }

    async fn check_updates(
        &self,
        installed: &IndexMap<String, PathBuf>,
    ) -> Result<Vec<TrainerUpdate>, TrainerError> {
        let index = self
            .index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let mut updates = Vec::new();
        for (name, path) in installed {
            let Some(local_version) = parse_version(name) else {
                continue;
            };
            let wanted = base_name(name).to_lowercase();
            let Some(remote) = index
                .iter()
                .find(|e| base_name(&e.name).to_lowercase() == wanted)
            else {
                continue;
            };
            let Some(remote_version) = remote
                .version
                .as_deref()
                .and_then(parse_version)
                .or_else(|| parse_version(&remote.name))
            else {
                continue;
            };
            if version_newer(&remote_version, &local_version) {
                updates.push(TrainerUpdate {
                    name: remote.name.clone(),
                    existing_path: path.clone(),
                    download_url: remote.download_url.clone(),
                });
            }
        }
        Ok(updates)
    }
}

fn load_cached_index(path: &Path) -> Vec<IndexEntry> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    match serde_json::from_str(&content) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!("discarding corrupt catalog cache {:?}: {err}", path);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with_index(entries: Vec<IndexEntry>) -> HttpCatalog {
        let catalog = HttpCatalog::new(
            "test",
            "http://localhost:0".to_string(),
            std::env::temp_dir().join("trainerhub-test-index.json"),
        );
        *catalog.index.write().unwrap() = entries;
        catalog
    }

    #[tokio::test]
    async fn test_check_updates_finds_newer_remote() {
        let catalog = catalog_with_index(vec![IndexEntry {
            name: "CoolGame v1.0.4".to_string(),
            version: None,
            download_url: "http://x/cg-104.zip".to_string(),
        }]);

        let mut installed = IndexMap::new();
        installed.insert(
            "CoolGame v1.0.3".to_string(),
            PathBuf::from("/lib/CoolGame/CoolGame.exe"),
        );

        let updates = catalog.check_updates(&installed).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].download_url, "http://x/cg-104.zip");
        assert_eq!(
            updates[0].existing_path,
            PathBuf::from("/lib/CoolGame/CoolGame.exe")
        );
    }

    #[tokio::test]
    async fn test_check_updates_skips_current_and_unversioned() {
        let catalog = catalog_with_index(vec![
            IndexEntry {
                name: "CoolGame v1.0.3".to_string(),
                version: None,
                download_url: "http://x/cg.zip".to_string(),
            },
            IndexEntry {
                name: "OtherGame v9.9".to_string(),
                version: None,
                download_url: "http://x/og.zip".to_string(),
            },
        ]);

        let mut installed = IndexMap::new();
        installed.insert("CoolGame v1.0.3".to_string(), PathBuf::from("/a"));
        installed.insert("NoVersionTrainer".to_string(), PathBuf::from("/b"));

        let updates = catalog.check_updates(&installed).await.unwrap();
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_prefers_cached_index() {
        let catalog = catalog_with_index(vec![IndexEntry {
            name: "CoolGame v1.0.3".to_string(),
            version: None,
            download_url: "http://x/cg.zip".to_string(),
        }]);

        let entry = CatalogEntry {
            name: "CoolGame".to_string(),
            detail_url: None,
        };
        let url = catalog.resolve_download_url(&entry).await.unwrap();
        assert_eq!(url, "http://x/cg.zip");
    }

    #[tokio::test]
    async fn test_resolve_without_source_is_network_error() {
        let catalog = catalog_with_index(Vec::new());
        let entry = CatalogEntry {
            name: "Unknown".to_string(),
            detail_url: None,
        };
        let err = catalog.resolve_download_url(&entry).await.unwrap_err();
        assert_eq!(err.class(), "network");
    }
}
