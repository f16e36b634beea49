// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared test fixtures: an in-memory catalog source that serves zip
//! archives it builds on the fly, with hooks for failure injection,
//! artificial latency and concurrency accounting.

#![allow(dead_code)]

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::Notify;
use zip::write::FileOptions;

use trainerhub::catalog::{CatalogEntry, TrainerSource, TrainerUpdate};
use trainerhub::error::TrainerError;
use trainerhub::status::StatusEvent;

pub struct MockSource {
    delay: Duration,
    fail_fetch: Mutex<HashSet<String>>,
    fetch_order: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    updates: Mutex<Vec<TrainerUpdate>>,
    refresh_count: AtomicUsize,
    refresh_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockSource {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::from_millis(0))
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_fetch: Mutex::new(HashSet::new()),
            fetch_order: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
            refresh_count: AtomicUsize::new(0),
            refresh_gate: Mutex::new(None),
        })
    }

    /// Make every fetch of `name` fail with a network error.
    pub fn fail_fetch_of(&self, name: &str) {
        self.fail_fetch.lock().unwrap().insert(name.to_string());
    }

    /// Answers returned by `check_updates`.
    pub fn set_updates(&self, updates: Vec<TrainerUpdate>) {
        *self.updates.lock().unwrap() = updates;
    }

    /// Block `refresh_index` until the returned handle is notified.
    pub fn gate_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.refresh_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Names fetched so far, in fetch order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetch_order.lock().unwrap().clone()
    }

    /// Highest number of concurrently active fetches observed.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrainerSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, keyword: &str) -> Result<Vec<CatalogEntry>, TrainerError> {
        Ok(vec![CatalogEntry {
            name: keyword.to_string(),
            detail_url: None,
        }])
    }

    async fn resolve_download_url(&self, entry: &CatalogEntry) -> Result<String, TrainerError> {
        Ok(format!("mock://{}", entry.name))
    }

    async fn fetch_archive(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, TrainerError> {
        let name = url.strip_prefix("mock://").unwrap_or(url).to_string();

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.fetch_order.lock().unwrap().push(name.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = if self.fail_fetch.lock().unwrap().contains(&name) {
            Err(TrainerError::Network(format!("{name}: connection reset")))
        } else {
            write_trainer_zip(&name, dest_dir)
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn refresh_index(&self) -> Result<usize, TrainerError> {
        let gate = self.refresh_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        Ok(42)
    }

    async fn fetch_translations(&self, data_dir: &Path) -> Result<u64, TrainerError> {
        std::fs::create_dir_all(data_dir)?;
        std::fs::write(data_dir.join("xgqdetail.json"), b"{}")?;
        Ok(2)
    }

    async fn check_updates(
        &self,
        _installed: &IndexMap<String, PathBuf>,
    ) -> Result<Vec<TrainerUpdate>, TrainerError> {
        Ok(self.updates.lock().unwrap().clone())
    }
}

/// Build `<name>.zip` containing `<name>/<name>.exe` in `dest_dir`.
fn write_trainer_zip(name: &str, dest_dir: &Path) -> Result<PathBuf, TrainerError> {
    std::fs::create_dir_all(dest_dir)?;
    let path = dest_dir.join(format!("{name}.zip"));
    let file = File::create(&path)?;
    let mut writer = zip::ZipWriter::new(file);
    writer.start_file(format!("{name}.exe"), FileOptions::default())?;
    writer.write_all(b"MZ mock trainer")?;
    writer
        .finish()
        .map_err(|e| TrainerError::Archive(e.to_string()))?;
    Ok(path)
}

/// Drop an installed trainer fixture directly into a library root.
pub fn install_fixture(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let exe = dir.join(format!("{name}.exe"));
    std::fs::write(&exe, b"MZ fixture").unwrap();
    exe
}

/// Await events until the named widget is removed, with a timeout.
pub async fn wait_widget_removed(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<StatusEvent>,
    widget: &str,
) {
    let wait = async {
        while let Some(event) = rx.recv().await {
            if matches!(&event, StatusEvent::WidgetRemove { name } if name == widget) {
                return;
            }
        }
        panic!("status channel closed before {widget} completed");
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {widget} to complete"));
}
