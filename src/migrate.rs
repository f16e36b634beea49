// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Library relocation.
//!
//! Moving the trainer library to a new root is copy-then-verify-then-
//! delete, never a move in place: if the process dies or a permission
//! error hits halfway through, the original library is still intact at
//! the old root. Only after every entry has been copied is the source
//! tree removed. Two terminal outcomes exist: the new root, or an error
//! the caller shows to the user while the library stays where it was.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TrainerError;

/// Relocate the whole library from `source` to `destination`.
///
/// Fails with [`TrainerError::Validation`] before touching any file when
/// the destination equals the source or lies inside it. Runs the bulk
/// copy on a blocking worker so large libraries do not stall the
/// controlling task.
pub async fn migrate(source: PathBuf, destination: PathBuf) -> Result<PathBuf, TrainerError> {
    validate(&source, &destination)?;

    tokio::task::spawn_blocking(move || migrate_blocking(&source, &destination))
        .await
        .map_err(|e| TrainerError::Filesystem(format!("migration worker died: {e}")))?
}

fn validate(source: &Path, destination: &Path) -> Result<(), TrainerError> {
    if normalized(source) == normalized(destination) {
        return Err(TrainerError::Validation(
            "please choose a new path".to_string(),
        ));
    }
    if destination.starts_with(source) && source.exists() {
        return Err(TrainerError::Validation(
            "the new path cannot be inside the current library".to_string(),
        ));
    }
    Ok(())
}

fn migrate_blocking(source: &Path, destination: &Path) -> Result<PathBuf, TrainerError> {
    fs::create_dir_all(destination)
        .map_err(|e| TrainerError::Filesystem(format!("cannot create {}: {e}", destination.display())))?;

    // Copy everything before deleting anything. Any failure aborts here
    // with the source untouched.
    if source.exists() {
        copy_tree(source, destination).map_err(|e| {
            TrainerError::Filesystem(format!(
                "error while copying the library to {}: {e}",
                destination.display()
            ))
        })?;

        fs::remove_dir_all(source).map_err(|e| {
            TrainerError::Filesystem(format!(
                "library copied, but the old root {} could not be removed: {e}",
                source.display()
            ))
        })?;
    }

    tracing::info!(
        "library migrated from {} to {}",
        source.display(),
        destination.display()
    );
    Ok(destination.to_path_buf())
}

/// Lexically normalized path for the equality check; canonicalization is
/// not used because the destination usually does not exist yet.
fn normalized(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
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
