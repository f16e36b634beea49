// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Periodic background refresh jobs.
//!
//! Four independently flagged job kinds keep the catalogs and the
//! installed trainers current: Fling metadata, XiaoXing metadata, the
//! trainer-name translation database, and trainer binary updates. A
//! timer ticks every kind its settings enable; a tick landing on a kind
//! whose flag is still set is skipped, which is the whole re-entrancy
//! story; refresh jobs routinely outlive the tick interval.
//!
//! The flag is cleared by a drop guard on every exit path, so a failed
//! job never wedges its kind. Each run emits a status-widget lifecycle
//! (`create` → `update` → `remove`) keyed by the kind's wire name; the
//! `remove` is the single completion signal per run.
//!
//! The trainer-update kind is a producer into the download queue: every
//! installed trainer with a newer remote version is enqueued as an
//! `is_update` request and handled by the same single-flight worker as
//! user-initiated downloads.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::catalog::TrainerSource;
use crate::config::Settings;
use crate::download::{DownloadQueue, DownloadRequest};
use crate::error::TrainerError;
use crate::library;
use crate::status::{Severity, StatusSink};

/// The four refresh job kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshKind {
    FlingData,
    XiaoXingData,
    Translations,
    TrainerUpdate,
}

impl RefreshKind {
    pub const ALL: [RefreshKind; 4] = [
        RefreshKind::FlingData,
        RefreshKind::XiaoXingData,
        RefreshKind::Translations,
        RefreshKind::TrainerUpdate,
    ];

    /// Wire name, also the status-widget key.
    pub fn key(&self) -> &'static str {
        match self {
            RefreshKind::FlingData => "fling",
            RefreshKind::XiaoXingData => "xiaoxing",
            RefreshKind::Translations => "translations",
            RefreshKind::TrainerUpdate => "trainerUpdate",
        }
    }

    fn index(&self) -> usize {
        match self {
            RefreshKind::FlingData => 0,
            RefreshKind::XiaoXingData => 1,
            RefreshKind::Translations => 2,
            RefreshKind::TrainerUpdate => 3,
        }
    }

    fn starting_text(&self) -> &'static str {
        match self {
            RefreshKind::FlingData => "Updating Fling data...",
            RefreshKind::XiaoXingData => "Updating XiaoXing data...",
            RefreshKind::Translations => "Updating translations...",
            RefreshKind::TrainerUpdate => "Checking for trainer updates...",
        }
    }
}

struct Inner {
    flags: [AtomicBool; 4],
    fling: Arc<dyn TrainerSource>,
    xiaoxing: Option<Arc<dyn TrainerSource>>,
    queue: DownloadQueue,
    library_root: PathBuf,
    data_dir: PathBuf,
    settings: Settings,
    events: StatusSink,
}

/// Clears a job-kind flag on every exit path, panics included.
struct FlagGuard {
    inner: Arc<Inner>,
    index: usize,
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.inner.flags[self.index].store(false, Ordering::SeqCst);
    }
}

/// Coordinates the periodic refresh jobs.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        fling: Arc<dyn TrainerSource>,
        xiaoxing: Option<Arc<dyn TrainerSource>>,
        queue: DownloadQueue,
        data_dir: PathBuf,
        settings: Settings,
        events: StatusSink,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                flags: [
                    AtomicBool::new(false),
                    AtomicBool::new(false),
                    AtomicBool::new(false),
                    AtomicBool::new(false),
                ],
                fling,
                xiaoxing,
                queue,
                library_root: settings.download_path.clone(),
                data_dir,
                settings,
                events,
            }),
        }
    }

    /// True while a run of `kind` is in flight.
    pub fn is_running(&self, kind: RefreshKind) -> bool {
        self.inner.flags[kind.index()].load(Ordering::SeqCst)
    }

    /// Start one run of `kind`, unless one is already in flight.
    ///
    /// Returns false (and starts nothing) when the kind's flag was set.
    pub fn start(&self, kind: RefreshKind) -> bool {
        let index = kind.index();
        if self.inner.flags[index]
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(kind = kind.key(), "refresh already running, tick skipped");
            return false;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _guard = FlagGuard { inner: inner.clone(), index };
            let key = kind.key();

            inner.events.widget_create(key, kind.starting_text());
            match run_job(&inner, kind).await {
                Ok(summary) => {
                    inner.events.widget_update(key, summary, Severity::Success);
                }
                Err(err) => {
                    tracing::warn!(kind = key, "refresh job failed: {err}");
                    inner
                        .events
                        .widget_update(key, format!("Update failed: {err}"), Severity::Failure);
                }
            }
            inner.events.widget_remove(key);
        });
        true
    }

    /// Tick every kind the settings enable. Running kinds are skipped.
    pub fn tick(&self) {
        let settings = &self.inner.settings;
        if settings.auto_update_translations {
            self.start(RefreshKind::Translations);
        }
        if settings.auto_update_fling_data {
            self.start(RefreshKind::FlingData);
        }
        if settings.auto_update_fling_trainers {
            self.start(RefreshKind::TrainerUpdate);
        }
        if settings.enable_xiao_xing && settings.auto_update_xiao_xing_data {
            self.start(RefreshKind::XiaoXingData);
        }
    }

    /// Drive [`tick`](Self::tick) forever on a fixed period. The timer
    /// itself is undisturbed by job failures; a kind becomes eligible
    /// again on the first tick after its flag clears.
    pub async fn run_timer(&self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick();
        }
    }
}

async fn run_job(inner: &Inner, kind: RefreshKind) -> Result<String, TrainerError> {
    match kind {
        RefreshKind::FlingData => {
            let count = inner.fling.refresh_index().await?;
            Ok(format!("Fling data updated, {count} trainers indexed"))
        }
        RefreshKind::XiaoXingData => match &inner.xiaoxing {
            Some(source) => {
                let count = source.refresh_index().await?;
                Ok(format!("XiaoXing data updated, {count} trainers indexed"))
            }
            None => Ok("XiaoXing source is disabled".to_string()),
        },
        RefreshKind::Translations => {
            let bytes = inner.fling.fetch_translations(&inner.data_dir).await?;
            Ok(format!("Translations updated ({bytes} bytes)"))
        }
        RefreshKind::TrainerUpdate => {
            let installed = library::rescan(&inner.library_root)?;
            let updates = inner.fling.check_updates(&installed).await?;
            let count = updates.len();
            for update in updates {
                let request = DownloadRequest::update(
                    update.name,
                    update.existing_path,
                    update.download_url,
                    inner.library_root.clone(),
                );
                inner.queue.enqueue(request)?;
            }
            if count == 0 {
                Ok("All trainers are up to date".to_string())
            } else {
                Ok(format!("{count} trainer update(s) queued"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_keys_are_stable() {
        let keys: Vec<&str> = RefreshKind::ALL.iter().map(|k| k.key()).collect();
        assert_eq!(keys, vec!["fling", "xiaoxing", "translations", "trainerUpdate"]);
    }

    #[test]
    fn test_kind_indices_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for kind in RefreshKind::ALL {
            assert!(seen.insert(kind.index()));
        }
    }
}
