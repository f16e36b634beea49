// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! trainerhub - local trainer library manager
//!
//! Search remote catalogs for game trainers, download and install them
//! into a local library, keep them updated in the background, and launch
//! or delete them on demand.
//!
//! The interesting part is the background coordination layer:
//!
//! - [`download`] - single-flight FIFO download queue and the
//!   fetch → extract → install task state machine
//! - [`refresh`] - periodic refresh jobs with per-kind re-entrancy guards
//! - [`migrate`] - copy-then-delete relocation of the whole library
//! - [`library`] - the installed-trainer index, rebuilt by directory scan
//! - [`catalog`] - remote catalog collaborators behind a narrow trait
//! - [`status`] - the worker → presentation event stream
//! - [`config`] - explicit settings object with a save/reload contract
//! - [`plugin`] - statically registered plugin interface

pub mod archive;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod library;
pub mod migrate;
pub mod plugin;
pub mod refresh;
pub mod status;

// Re-export commonly used types
pub use catalog::{CatalogEntry, HttpCatalog, TrainerSource, TrainerUpdate};
pub use config::Settings;
pub use download::{DownloadQueue, DownloadRequest, TaskOutcome, TaskPhase, TaskReport};
pub use error::TrainerError;
pub use library::LibraryIndex;
pub use migrate::migrate;
pub use plugin::{available_plugins, load_plugins, Plugin, PluginContext};
pub use refresh::{RefreshCoordinator, RefreshKind};
pub use status::{Severity, StatusEvent, StatusLine, StatusSink};
