// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Application settings.
//!
//! A single [`Settings`] value is loaded at startup and handed to each
//! component at construction. Nothing reads ambient global state; whoever
//! mutates a setting calls [`Settings::save`] explicitly.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Persisted user settings.
///
/// Field names stay camelCase on disk for compatibility with settings
/// files written by earlier releases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Root of the trainer library on disk.
    pub download_path: PathBuf,
    pub language: String,
    pub theme: String,
    pub check_app_update: bool,
    pub show_warning: bool,
    pub auto_update_translations: bool,

    // Trainer source configuration
    pub fling_download_server: String,
    pub auto_update_fling_data: bool,
    pub auto_update_fling_trainers: bool,
    pub enable_xiao_xing: bool,
    pub auto_update_xiao_xing_data: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_path: default_library_root(),
            language: "English".to_string(),
            theme: "black".to_string(),
            check_app_update: true,
            show_warning: true,
            auto_update_translations: true,
            fling_download_server: "intl".to_string(),
            auto_update_fling_data: true,
            auto_update_fling_trainers: true,
            enable_xiao_xing: true,
            auto_update_xiao_xing_data: true,
        }
    }
}

impl Settings {
    /// Load settings from disk, falling back to defaults for a missing or
    /// unreadable file. Unknown keys are ignored, missing keys take their
    /// default, so old settings files keep working.
    pub fn load() -> Result<Self> {
        let path = settings_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read settings file {:?}", path))?;
        match serde_json::from_str(&content) {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::warn!("settings file is corrupt ({err}), using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write settings to disk, pretty-printed.
    pub fn save(&self) -> Result<()> {
        let path = settings_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("failed to write settings file {:?}", path))?;
        Ok(())
    }

    /// Make sure the library root exists, resetting it to the default
    /// location if it cannot be created (e.g. points at a removed drive).
    pub fn ensure_library_root(&mut self) -> Result<()> {
        if fs::create_dir_all(&self.download_path).is_err() {
            self.download_path = default_library_root();
            fs::create_dir_all(&self.download_path).with_context(|| {
                format!("failed to create library root {:?}", self.download_path)
            })?;
            self.save()?;
        }
        Ok(())
    }
}

/// Directory for settings and the single-instance lock file.
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .context("could not determine the user config directory")?
        .join("trainerhub");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Directory for catalog index caches and the translations database.
pub fn data_dir() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .context("could not determine the user data directory")?
        .join("trainerhub")
        .join("db");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Scratch space for in-flight archive downloads.
pub fn temp_download_dir() -> PathBuf {
    std::env::temp_dir().join("trainerhub").join("download")
}

fn settings_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("settings.json"))
}

fn default_library_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trainerhub")
        .join("trainers")
}
