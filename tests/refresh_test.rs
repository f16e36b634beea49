// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Refresh coordinator properties: per-kind re-entrancy guards, flag
//! lifecycle, and the trainer-update job feeding the download queue.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use trainerhub::catalog::TrainerUpdate;
use trainerhub::config::Settings;
use trainerhub::download::DownloadQueue;
use trainerhub::library;
use trainerhub::refresh::{RefreshCoordinator, RefreshKind};
use trainerhub::status::StatusSink;

use common::{install_fixture, wait_widget_removed, MockSource};

fn coordinator_with(
    source: Arc<MockSource>,
    library_root: PathBuf,
    data_dir: PathBuf,
) -> (
    RefreshCoordinator,
    DownloadQueue,
    mpsc::UnboundedReceiver<trainerhub::status::StatusEvent>,
    mpsc::UnboundedReceiver<trainerhub::download::TaskReport>,
) {
    let (events, events_rx) = StatusSink::channel();
    let (reports_tx, reports_rx) = mpsc::unbounded_channel();
    let queue = DownloadQueue::spawn(source.clone(), events.clone(), reports_tx);

    let mut settings = Settings::default();
    settings.download_path = library_root;

    let coordinator = RefreshCoordinator::new(
        source,
        None,
        queue.clone(),
        data_dir,
        settings,
        events,
    );
    (coordinator, queue, events_rx, reports_rx)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_start_while_running_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new();
    let gate = source.gate_refresh();
    let (coordinator, _queue, mut events_rx, _reports_rx) = coordinator_with(
        source.clone(),
        dir.path().join("lib"),
        dir.path().join("db"),
    );

    assert!(coordinator.start(RefreshKind::FlingData));
    assert!(coordinator.is_running(RefreshKind::FlingData));

    // Two rapid starts before the first completes: the second is a no-op.
    assert!(!coordinator.start(RefreshKind::FlingData));
    assert!(!coordinator.start(RefreshKind::FlingData));

    gate.notify_one();
    wait_widget_removed(&mut events_rx, "fling").await;

    // Exactly one run happened, one completion signal was observed.
    assert_eq!(source.refreshes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_works_again_after_flag_clears() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new();
    let (coordinator, _queue, mut events_rx, _reports_rx) = coordinator_with(
        source.clone(),
        dir.path().join("lib"),
        dir.path().join("db"),
    );

    assert!(coordinator.start(RefreshKind::FlingData));
    wait_widget_removed(&mut events_rx, "fling").await;

    // Flag cleared by the drop guard; a fresh run starts.
    for _ in 0..50 {
        if !coordinator.is_running(RefreshKind::FlingData) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(coordinator.start(RefreshKind::FlingData));
    wait_widget_removed(&mut events_rx, "fling").await;
    assert_eq!(source.refreshes(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kinds_run_independently() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new();
    let gate = source.gate_refresh();
    let (coordinator, _queue, mut events_rx, _reports_rx) = coordinator_with(
        source.clone(),
        dir.path().join("lib"),
        dir.path().join("db"),
    );

    // FlingData is gated (running); Translations must still start.
    assert!(coordinator.start(RefreshKind::FlingData));
    assert!(coordinator.start(RefreshKind::Translations));
    wait_widget_removed(&mut events_rx, "translations").await;
    assert!(coordinator.is_running(RefreshKind::FlingData));

    gate.notify_one();
    wait_widget_removed(&mut events_rx, "fling").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_job_clears_flag_and_reports_failure_widget() {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new();
    // Translations into an impossible location: the job fails, the
    // coordinator must still clear the flag and emit the completion.
    let bad_data_dir = dir.path().join("file-not-dir");
    std::fs::write(&bad_data_dir, b"occupied").unwrap();

    let (coordinator, _queue, mut events_rx, _reports_rx) =
        coordinator_with(source, dir.path().join("lib"), bad_data_dir);

    assert!(coordinator.start(RefreshKind::Translations));

    let mut saw_failure_update = false;
    let wait = async {
        while let Some(event) = events_rx.recv().await {
            match &event {
                trainerhub::status::StatusEvent::WidgetUpdate { name, state, .. }
                    if name == "translations" =>
                {
                    saw_failure_update = *state == trainerhub::status::Severity::Failure;
                }
                trainerhub::status::StatusEvent::WidgetRemove { name }
                    if name == "translations" =>
                {
                    return;
                }
                _ => {}
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("translations job never completed");
    assert!(saw_failure_update);

    for _ in 0..50 {
        if !coordinator.is_running(RefreshKind::Translations) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("flag never cleared after a failed job");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_trainer_update_job_feeds_download_queue() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("lib");
    let old_exe = install_fixture(&lib, "CoolGame v1.0.3");

    let source = MockSource::new();
    source.set_updates(vec![TrainerUpdate {
        name: "CoolGame v1.0.4".to_string(),
        existing_path: old_exe.clone(),
        download_url: "mock://CoolGame v1.0.4".to_string(),
    }]);

    let (coordinator, queue, mut events_rx, mut reports_rx) =
        coordinator_with(source, lib.clone(), dir.path().join("db"));

    assert!(coordinator.start(RefreshKind::TrainerUpdate));
    wait_widget_removed(&mut events_rx, "trainerUpdate").await;

    // The job enqueued one is_update request; the queue installs the new
    // version and removes the old one.
    let report = tokio::time::timeout(Duration::from_secs(10), reports_rx.recv())
        .await
        .expect("timed out waiting for the update download")
        .expect("report channel closed");
    assert_eq!(report.name, "CoolGame v1.0.4");
    assert!(report.outcome.is_success());

    queue.idle().await;
    let index = library::rescan(&lib).unwrap();
    assert!(index.contains_key("CoolGame v1.0.4"));
    assert!(!index.contains_key("CoolGame v1.0.3"));
    assert!(!old_exe.exists());
}
