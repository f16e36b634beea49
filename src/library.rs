// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The installed-trainer index.
//!
//! The index is always rebuilt from a directory scan, never patched in
//! place; any operation that may have touched the filesystem (download,
//! delete, import, migration) is followed by a [`rescan`]. That trades a
//! small scan cost for an index that cannot drift from reality.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use indexmap::IndexMap;
use pinyin::ToPinyin;

use crate::error::TrainerError;

/// Installed trainers, name → executable path, in display order.
pub type LibraryIndex = IndexMap<String, PathBuf>;

/// Executables that live next to trainers but are not trainers.
const EXE_DENYLIST: &[&str] = &["flashplayer_22.0.0.210_ax_debug.exe"];

/// Walk one level of `root` and build the trainer index.
///
/// A regular nonzero `.exe` file becomes an entry named by its stem. A
/// subdirectory is searched (non-recursively) for its first qualifying
/// executable; when found, the directory name becomes the entry, pointing
/// at the inner executable. Dot-prefixed entries are staging artifacts
/// and are skipped. Entries come back in locale-aware order: Chinese
/// names by pinyin transliteration, everything else lexicographically.
pub fn rescan(root: &Path) -> Result<LibraryIndex, TrainerError> {
    let mut found: Vec<(String, PathBuf)> = Vec::new();

    if !root.exists() {
        return Ok(LibraryIndex::new());
    }

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.starts_with('.') {
            continue;
        }

        if path.is_file() {
            if is_trainer_exe(&path) {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or(file_name);
                found.push((name, path));
            }
        } else if path.is_dir() {
            if let Some(exe) = first_trainer_exe_in(&path)? {
                found.push((file_name, exe));
            }
        }
    }

    found.sort_by(|a, b| sort_key(&a.0).cmp(&sort_key(&b.0)));
    Ok(found.into_iter().collect())
}

/// Launch a trainer with its own directory as the working directory.
///
/// Trainers poke at game processes, so on Windows the launch goes through
/// an elevation prompt.
pub fn launch(index: &LibraryIndex, name: &str) -> Result<(), TrainerError> {
    let path = index
        .get(name)
        .ok_or_else(|| TrainerError::Validation(format!("no trainer named {name}")))?;
    let workdir = path.parent().unwrap_or_else(|| Path::new("."));

    #[cfg(windows)]
    {
        let script = format!(
            "Start-Process -FilePath '{}' -WorkingDirectory '{}' -Verb RunAs",
            path.display(),
            workdir.display()
        );
        Command::new("powershell")
            .args(["-NoProfile", "-Command", &script])
            .spawn()?;
    }

    #[cfg(not(windows))]
    {
        Command::new(path).current_dir(workdir).spawn()?;
    }

    Ok(())
}

/// Delete an installed trainer.
///
/// When the executable sits in its own folder (folder named after the
/// trainer), the whole folder goes; otherwise just the file. A locked
/// executable maps to [`TrainerError::InUse`] so the caller can show
/// retry-after-close guidance. Callers rescan afterwards.
pub fn delete(index: &LibraryIndex, name: &str) -> Result<(), TrainerError> {
    let path = index
        .get(name)
        .ok_or_else(|| TrainerError::Validation(format!("no trainer named {name}")))?;

    remove_files(path, name).map_err(|err| {
        // A sharing violation surfaces as PermissionDenied while the
        // trainer process still holds the file open.
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            TrainerError::InUse {
                name: name.to_string(),
            }
        } else {
            TrainerError::Filesystem(err.to_string())
        }
    })
}

/// Remove the installation that `path` belongs to: the parent directory
/// when it is the trainer's own folder, otherwise the file itself.
pub fn remove_installation(path: &Path, name: &str) -> Result<(), TrainerError> {
    remove_files(path, name).map_err(|err| TrainerError::Filesystem(err.to_string()))
}

fn remove_files(path: &Path, name: &str) -> Result<(), std::io::Error> {
    clear_readonly(path)?;

    let own_folder = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|f| f.to_string_lossy() == name)
        .unwrap_or(false);

    match path.parent() {
        Some(parent) if own_folder => fs::remove_dir_all(parent),
        _ => fs::remove_file(path),
    }
}

/// Copy user-provided trainer executables into the library root.
/// Returns how many files were imported. Callers rescan afterwards.
pub fn import(root: &Path, files: &[PathBuf]) -> Result<usize, TrainerError> {
    fs::create_dir_all(root)?;
    let mut imported = 0;
    for file in files {
        let file_name = file
            .file_name()
            .ok_or_else(|| TrainerError::Validation(format!("{} has no file name", file.display())))?;
        let dst = root.join(file_name);
        if dst.exists() {
            clear_readonly(&dst)?;
        }
        fs::copy(file, &dst)?;
        tracing::info!("trainer imported: {}", file.display());
        imported += 1;
    }
    Ok(imported)
}

/// Sort key matching the display ordering: Chinese characters are
/// replaced by their pinyin reading, everything else passes through.
fn sort_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() * 2);
    for (c, py) in name.chars().zip(name.to_pinyin()) {
        match py {
            Some(p) => {
                key.push_str(p.plain());
                key.push(' ');
            }
            None => key.push(c),
        }
    }
    key.to_lowercase()
}

fn is_exe(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("exe"))
        .unwrap_or(false)
}

fn is_trainer_exe(path: &Path) -> bool {
    is_exe(path)
        && fs::metadata(path)
            .map(|meta| meta.len() > 0)
            .unwrap_or(false)
}

fn first_trainer_exe_in(dir: &Path) -> Result<Option<PathBuf>, TrainerError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_file()
            && is_trainer_exe(&path)
            && !EXE_DENYLIST.iter().any(|d| d.eq_ignore_ascii_case(&name))
        {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

fn clear_readonly(path: &Path) -> Result<(), std::io::Error> {
    let meta = fs::metadata(path)?;
    let mut perms = meta.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn touch_exe(path: &Path, bytes: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut f = File::create(path).unwrap();
        f.write_all(bytes).unwrap();
    }

    #[test]
    fn test_rescan_finds_files_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        touch_exe(&dir.path().join("Bare Trainer.exe"), b"MZ");
        touch_exe(&dir.path().join("CoolGame").join("CoolGame.exe"), b"MZ");
        touch_exe(&dir.path().join("CoolGame").join("data.bin"), b"x");

        let index = rescan(dir.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.get("Bare Trainer").unwrap(),
            &dir.path().join("Bare Trainer.exe")
        );
        assert_eq!(
            index.get("CoolGame").unwrap(),
            &dir.path().join("CoolGame").join("CoolGame.exe")
        );
    }

    #[test]
    fn test_rescan_skips_zero_byte_and_denylisted() {
        let dir = tempfile::tempdir().unwrap();
        touch_exe(&dir.path().join("Empty.exe"), b"");
        touch_exe(
            &dir.path()
                .join("Flashy")
                .join("flashplayer_22.0.0.210_ax_debug.exe"),
            b"MZ",
        );

        let index = rescan(dir.path()).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_rescan_skips_dot_entries() {
        let dir = tempfile::tempdir().unwrap();
        touch_exe(&dir.path().join(".CoolGame.staging").join("CoolGame.exe"), b"MZ");
        touch_exe(&dir.path().join("Real.exe"), b"MZ");

        let index = rescan(dir.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.contains_key("Real"));
    }

    #[test]
    fn test_rescan_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = rescan(&dir.path().join("nope")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_ordering_mixes_pinyin_and_latin() {
        let dir = tempfile::tempdir().unwrap();
        // 植物大战僵尸 begins with zhi..., 艾尔登 begins with ai...
        touch_exe(&dir.path().join("植物大战僵尸.exe"), b"MZ");
        touch_exe(&dir.path().join("艾尔登法环.exe"), b"MZ");
        touch_exe(&dir.path().join("Banana.exe"), b"MZ");

        let index = rescan(dir.path()).unwrap();
        let names: Vec<&String> = index.keys().collect();
        assert_eq!(names, vec!["艾尔登法环", "Banana", "植物大战僵尸"]);
    }

    #[test]
    fn test_delete_file_and_own_folder() {
        let dir = tempfile::tempdir().unwrap();
        touch_exe(&dir.path().join("Bare.exe"), b"MZ");
        touch_exe(&dir.path().join("CoolGame").join("CoolGame.exe"), b"MZ");

        let index = rescan(dir.path()).unwrap();
        delete(&index, "Bare").unwrap();
        delete(&index, "CoolGame").unwrap();

        assert!(!dir.path().join("Bare.exe").exists());
        assert!(!dir.path().join("CoolGame").exists());
        assert!(rescan(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_delete_unknown_is_validation_error() {
        let index = LibraryIndex::new();
        let err = delete(&index, "Ghost").unwrap_err();
        assert_eq!(err.class(), "validation");
    }

    #[test]
    fn test_import_copies_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("incoming");
        let root = dir.path().join("lib");
        touch_exe(&src.join("New.exe"), b"MZ new");
        touch_exe(&root.join("New.exe"), b"MZ old");

        let count = import(&root, &[src.join("New.exe")]).unwrap();
        assert_eq!(count, 1);
        assert_eq!(fs::read(root.join("New.exe")).unwrap(), b"MZ new");
    }
}
