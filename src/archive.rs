// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trainer package extraction.
//!
//! Catalogs serve trainers as zip archives; whatever the archive contains
//! is unpacked as-is into a directory tree, one entry of which is the
//! trainer executable found later by the library scan.

use std::fs::File;
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::TrainerError;

/// Unpack `archive_path` into `destination`, creating it if needed.
///
/// Entries with names that would escape the destination are skipped.
/// A corrupt or non-zip file maps to [`TrainerError::Archive`].
pub fn extract(archive_path: &Path, destination: &Path) -> Result<(), TrainerError> {
    std::fs::create_dir_all(destination)?;

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    if archive.len() == 0 {
        return Err(TrainerError::Archive(format!(
            "{} contains no entries",
            archive_path.display()
        )));
    }

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let outpath = match entry.enclosed_name() {
            Some(path) => destination.join(path),
            None => continue,
        };

        if entry.name().ends_with('/') {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let mut outfile = File::create(&outpath)?;
            io::copy(&mut entry, &mut outfile)?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(())
}
