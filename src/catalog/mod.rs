// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Remote trainer catalogs.
//!
//! A catalog is a narrow collaborator: it can search for trainers, resolve
//! a download URL, fetch an archive, refresh its local metadata index and
//! report which installed trainers have newer remote versions. The HTML
//! and endpoint specifics live behind [`TrainerSource`]; everything above
//! it (queue, refresh jobs, CLI) only sees these five operations.

pub mod http;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TrainerError;

pub use http::HttpCatalog;

/// One search hit: a trainer the catalog can provide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    /// Page the download link is resolved from, when the catalog needs a
    /// second round trip; direct-download catalogs leave this empty.
    #[serde(default)]
    pub detail_url: Option<String>,
}

/// An installed trainer whose remote version is newer.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerUpdate {
    pub name: String,
    pub existing_path: PathBuf,
    pub download_url: String,
}

/// Remote trainer catalog operations.
#[async_trait]
pub trait TrainerSource: Send + Sync {
    /// Catalog name used in logs and status widgets.
    fn name(&self) -> &str;

    /// Search the catalog for trainers matching `keyword`.
    async fn search(&self, keyword: &str) -> Result<Vec<CatalogEntry>, TrainerError>;

    /// Resolve the archive URL for a search hit.
    async fn resolve_download_url(&self, entry: &CatalogEntry) -> Result<String, TrainerError>;

    /// Download the archive at `url` into `dest_dir`, returning the file path.
    async fn fetch_archive(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, TrainerError>;

    /// Refresh the locally cached catalog index; returns the entry count.
    async fn refresh_index(&self) -> Result<usize, TrainerError>;

    /// Fetch the trainer-name translation database into `data_dir`;
    /// returns the number of bytes written.
    async fn fetch_translations(&self, data_dir: &Path) -> Result<u64, TrainerError>;

    /// Compare `installed` trainers against the catalog and report those
    /// with a newer remote version.
    async fn check_updates(
        &self,
        installed: &IndexMap<String, PathBuf>,
    ) -> Result<Vec<TrainerUpdate>, TrainerError>;
}

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bv(?:er)?\.?\s*([0-9]+(?:\.[0-9]+)*)").unwrap());

/// Parse a version out of a trainer name, e.g. `"CoolGame v1.0.3 Trainer"`.
pub fn parse_version(name: &str) -> Option<Vec<u32>> {
    let caps = VERSION_RE.captures(name)?;
    let parts: Vec<u32> = caps[1]
        .split('.')
        .filter_map(|p| p.parse().ok())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

/// The trainer name with any version suffix removed, for matching an
/// installed trainer against a catalog entry.
pub fn base_name(name: &str) -> String {
    VERSION_RE.replace(name, "").trim().to_string()
}

/// Numeric version comparison; shorter vectors compare as zero-padded.
pub fn version_newer(remote: &[u32], local: &[u32]) -> bool {
    let len = remote.len().max(local.len());
    for i in 0..len {
        let r = remote.get(i).copied().unwrap_or(0);
        let l = local.get(i).copied().unwrap_or(0);
        if r != l {
            return r > l;
        }
    }
    false
}
