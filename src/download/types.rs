// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download request and task types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::catalog::CatalogEntry;
use crate::library::LibraryIndex;

/// One queued download. Immutable once enqueued; one request is one
/// queue entry and produces exactly one task run.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// The trainer being requested.
    pub entry: CatalogEntry,
    /// Installed trainers at enqueue time, for status context.
    pub library_snapshot: LibraryIndex,
    /// Library root the trainer installs into.
    pub destination: PathBuf,
    /// True when this request replaces an existing installation.
    pub is_update: bool,
    /// Previous installation to remove after the new copy is staged.
    pub existing_path: Option<PathBuf>,
    /// Pre-resolved archive URL (always set for updates); when `None`
    /// the task resolves the URL through the catalog.
    pub resolved_url: Option<String>,
    pub queued_at: DateTime<Utc>,
}

impl DownloadRequest {
    /// A user-initiated download of a search hit.
    pub fn new(entry: CatalogEntry, library_snapshot: LibraryIndex, destination: PathBuf) -> Self {
        Self {
            entry,
            library_snapshot,
            destination,
            is_update: false,
            existing_path: None,
            resolved_url: None,
            queued_at: Utc::now(),
        }
    }

    /// An automatic update of an installed trainer.
    pub fn update(
        name: impl Into<String>,
        existing_path: PathBuf,
        download_url: impl Into<String>,
        destination: PathBuf,
    ) -> Self {
        Self {
            entry: CatalogEntry {
                name: name.into(),
                detail_url: None,
            },
            library_snapshot: LibraryIndex::new(),
            destination,
            is_update: true,
            existing_path: Some(existing_path),
            resolved_url: Some(download_url.into()),
            queued_at: Utc::now(),
        }
    }
}

/// Phases of one download task.
///
/// `Pending → Fetching → Extracting → Installing → {Succeeded, Failed}`.
/// Every transition emits one status line; only the terminal two carry
/// the coarse success/failure signal the controller acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPhase {
    Pending,
    Fetching,
    Extracting,
    Installing,
    Succeeded,
    Failed,
}

impl TaskPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskPhase::Succeeded | TaskPhase::Failed)
    }
}

/// Terminal result of one task run.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded { installed_path: PathBuf },
    Failed { error: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }
}

/// Completion report published by the queue controller after each task,
/// carrying the freshly rebuilt library index.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub name: String,
    pub outcome: TaskOutcome,
    pub library: LibraryIndex,
    pub finished_at: DateTime<Utc>,
}
