// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error taxonomy for trainer operations.
//!
//! Worker tasks never let one of these escape to the controller uncaught:
//! terminal failures are converted into a single user-facing status line.
//! `InUse` is kept separate from generic filesystem failures so deletion
//! can show retry-after-close guidance instead of a permissions error.

use std::io;
use thiserror::Error;

/// Failure classes for downloads, migration and library maintenance.
#[derive(Debug, Error)]
pub enum TrainerError {
    /// DNS/connect/HTTP failure while talking to a catalog or download server.
    #[error("network error: {0}")]
    Network(String),

    /// Corrupt or unsupported trainer package.
    #[error("archive error: {0}")]
    Archive(String),

    /// Permission denied, disk full, path vanished mid-operation.
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// Pre-flight rejection; nothing was touched.
    #[error("{0}")]
    Validation(String),

    /// The target executable is locked by a running process.
    #[error("{name} is currently in use, please close any programs using the file and try again")]
    InUse { name: String },
}

impl TrainerError {
    /// Short machine-readable class name, used in logs.
    pub fn class(&self) -> &'static str {
        match self {
            TrainerError::Network(_) => "network",
            TrainerError::Archive(_) => "archive",
            TrainerError::Filesystem(_) => "filesystem",
            TrainerError::Validation(_) => "validation",
            TrainerError::InUse { .. } => "in-use",
        }
    }
}

impl From<reqwest::Error> for TrainerError {
    fn from(err: reqwest::Error) -> Self {
        TrainerError::Network(err.to_string())
    }
}

impl From<zip::result::ZipError> for TrainerError {
    fn from(err: zip::result::ZipError) -> Self {
        TrainerError::Archive(err.to_string())
    }
}

impl From<io::Error> for TrainerError {
    fn from(err: io::Error) -> Self {
        TrainerError::Filesystem(err.to_string())
    }
}
