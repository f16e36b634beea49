// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Statically registered plugins.
//!
//! Plugins implement one fixed capability interface and are listed in
//! [`available_plugins`]; there is no runtime discovery. A plugin that
//! fails to initialize is reported and skipped, it cannot take the
//! application down.

use std::path::PathBuf;

use anyhow::Result;

/// Context handed to plugins at initialization.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Root of the trainer library.
    pub library_root: PathBuf,
    /// Scratch directory used for in-flight downloads.
    pub temp_download_dir: PathBuf,
}

/// The fixed plugin capability interface.
pub trait Plugin: Send {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn version(&self) -> &str;
    fn author(&self) -> &str;
    fn initialize(&mut self, ctx: &PluginContext) -> Result<()>;
    fn cleanup(&mut self) -> Result<()>;
}

/// The static plugin registry.
pub fn available_plugins() -> Vec<Box<dyn Plugin>> {
    vec![Box::new(AntivirusPlugin::default())]
}

/// Initialize every registered plugin, returning the ones that came up.
pub fn load_plugins(ctx: &PluginContext) -> Vec<Box<dyn Plugin>> {
    let mut loaded = Vec::new();
    for mut plugin in available_plugins() {
        match plugin.initialize(ctx) {
            Ok(()) => {
                tracing::info!("plugin loaded: {} v{}", plugin.name(), plugin.version());
                loaded.push(plugin);
            }
            Err(err) => {
                tracing::warn!("plugin {} failed to initialize: {err}", plugin.name());
            }
        }
    }
    loaded
}

/// Adds the library and download paths to the Windows Defender exclusion
/// list so freshly downloaded trainers are not quarantined mid-install.
/// Everywhere else this is a no-op.
#[derive(Debug, Default)]
pub struct AntivirusPlugin {
    #[cfg_attr(not(windows), allow(dead_code))]
    excluded: Vec<PathBuf>,
}

impl Plugin for AntivirusPlugin {
    fn name(&self) -> &str {
        "Antivirus Exclusions"
    }

    fn description(&self) -> &str {
        "Keeps Windows Defender from quarantining downloaded trainers"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn author(&self) -> &str {
        "Morgan Forge"
    }

    #[cfg(windows)]
    fn initialize(&mut self, ctx: &PluginContext) -> Result<()> {
        use std::process::Command;

        for path in [&ctx.library_root, &ctx.temp_download_dir] {
            let script = format!(
                "Add-MpPreference -ExclusionPath '{}'",
                path.display()
            );
            let status = Command::new("powershell")
                .args(["-NoProfile", "-Command", &script])
                .status()?;
            if !status.success() {
                anyhow::bail!("Add-MpPreference exited with {status}");
            }
            self.excluded.push(path.clone());
        }
        Ok(())
    }

    #[cfg(not(windows))]
    fn initialize(&mut self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    #[cfg(windows)]
    fn cleanup(&mut self) -> Result<()> {
        use std::process::Command;

        for path in self.excluded.drain(..) {
            let script = format!(
                "Remove-MpPreference -ExclusionPath '{}'",
                path.display()
            );
            let _ = Command::new("powershell")
                .args(["-NoProfile", "-Command", &script])
                .status();
        }
        Ok(())
    }

    #[cfg(not(windows))]
    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}
