// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! One fetch-and-extract-and-install operation.
//!
//! The task walks `Pending → Fetching → Extracting → Installing` and ends
//! in `Succeeded` or `Failed`. Failures are converted into a terminal
//! status line here; nothing escapes to the queue controller as an error.
//! There is no automatic retry, a retry is a user-initiated re-enqueue.
//!
//! Updates follow a stage-then-swap contract: the new tree is fully in
//! place under the library root before the previous installation is
//! removed, so an interruption between those steps can leave both copies
//! on disk but never zero.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::types::{DownloadRequest, TaskOutcome, TaskPhase};
use crate::archive;
use crate::catalog::TrainerSource;
use crate::error::TrainerError;
use crate::library;
use crate::status::StatusSink;

/// Execute one download request to its terminal state.
pub async fn run(
    request: &DownloadRequest,
    source: &dyn TrainerSource,
    events: &StatusSink,
) -> TaskOutcome {
    let name = request.entry.name.clone();
    match run_inner(request, source, events).await {
        Ok(installed_path) => {
            events.success(format!("{name} installed"));
            TaskOutcome::Succeeded { installed_path }
        }
        Err(err) => {
            tracing::warn!(trainer = %name, class = err.class(), "download failed: {err}");
            events.failure(format!("Failed to download {name}: {err}"));
            TaskOutcome::Failed {
                error: err.to_string(),
            }
        }
    }
}

async fn run_inner(
    request: &DownloadRequest,
    source: &dyn TrainerSource,
    events: &StatusSink,
) -> Result<PathBuf, TrainerError> {
    let name = &request.entry.name;
    let mut phase = TaskPhase::Pending;

    // Fetching: resolve the archive URL and pull it into task-scoped
    // scratch space. The TempDir removes all artifacts when the task
    // ends, success or failure.
    advance(&mut phase, TaskPhase::Fetching);
    events.info(format!("Downloading {name}..."));

    let url = match &request.resolved_url {
        Some(url) => url.clone(),
        None => source.resolve_download_url(&request.entry).await?,
    };

    let scratch = TempDir::new()?;
    let archive_path = source.fetch_archive(&url, scratch.path()).await?;

    // Extracting: unpack into the scratch dir. Extraction is blocking
    // I/O, so it leaves the async worker.
    advance(&mut phase, TaskPhase::Extracting);
    events.info(format!("Unpacking {name}..."));

    let staging = scratch.path().join("unpacked");
    let unpack_archive = archive_path.clone();
    let unpack_staging = staging.clone();
    tokio::task::spawn_blocking(move || archive::extract(&unpack_archive, &unpack_staging))
        .await
        .map_err(|e| TrainerError::Archive(format!("extraction worker died: {e}")))??;

    // Installing: stage the new tree under the library root, then (for
    // updates) drop the previous installation.
    advance(&mut phase, TaskPhase::Installing);
    events.info(format!("Installing {name}..."));

    let installed = stage_install(&staging, &request.destination, name)?;
    if request.is_update {
        if let Some(existing) = &request.existing_path {
            remove_previous(existing, &request.destination, &installed)?;
        }
    }

    advance(&mut phase, TaskPhase::Succeeded);
    Ok(installed)
}

fn advance(phase: &mut TaskPhase, next: TaskPhase) {
    tracing::debug!(from = ?phase, to = ?next, "task transition");
    *phase = next;
}

/// Copy the extracted tree into `destination/<name>`.
///
/// The copy lands in a dot-prefixed sibling first (same filesystem as the
/// final location, invisible to the library scan) and is swapped in by
/// rename, so the final name only ever points at a complete tree.
pub fn stage_install(
    staging: &Path,
    destination: &Path,
    name: &str,
) -> Result<PathBuf, TrainerError> {
    fs::create_dir_all(destination)?;

    let staged = destination.join(format!(".{name}.staging"));
    if staged.exists() {
        fs::remove_dir_all(&staged)?;
    }
    copy_tree(staging, &staged)?;

    let target = destination.join(name);
    let backup = destination.join(format!(".{name}.old"));
    if backup.exists() {
        fs::remove_dir_all(&backup)?;
    }
    if target.exists() {
        fs::rename(&target, &backup)?;
    }
    fs::rename(&staged, &target)?;
    if backup.exists() {
        fs::remove_dir_all(&backup)?;
    }

    Ok(target)
}

/// Remove the pre-update installation once the new tree is in place.
///
/// Only paths inside the library root are touched, and never the fresh
/// install itself.
pub fn remove_previous(
    existing: &Path,
    destination: &Path,
    new_install: &Path,
) -> Result<(), TrainerError> {
    if !existing.exists() || existing.starts_with(new_install) {
        return Ok(());
    }
    if !existing.starts_with(destination) {
        tracing::warn!(
            "refusing to remove previous installation outside the library: {}",
            existing.display()
        );
        return Ok(());
    }

    match existing.parent() {
        // Trainer in its own folder under the root: the folder goes.
        Some(parent) if parent != destination && parent != new_install => {
            let folder_name = parent
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            let inner = existing
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            tracing::debug!("removing previous installation {folder_name}/{inner}");
            fs::remove_dir_all(parent)?;
        }
        // Bare executable directly under the root.
        _ => {
            library::remove_installation(existing, "")?;
        }
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), TrainerError> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        if src.is_dir() {
            copy_tree(&src, &dst)?;
        } else {
            fs::copy(&src, &dst)?;
        }
    }
    Ok(())
}
