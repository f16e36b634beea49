// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Single-flight download queue controller.
//!
//! All download requests, user-initiated and auto-update alike, funnel
//! into one FIFO queue owned by a background worker task. The worker runs
//! at most one download task at a time and drains the queue in strict
//! arrival order with no external driving: finishing one task (success or
//! failure) rescans the library, publishes a [`TaskReport`] and starts
//! the next queued request.
//!
//! Callers talk to the worker through a cloneable [`DownloadQueue`]
//! handle: commands go in over an mpsc channel, the busy flag comes back
//! over a watch channel. The busy flag is what the presentation layer
//! uses to disable search/download affordances while a transfer runs.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};

use super::task;
use super::types::{DownloadRequest, TaskReport};
use crate::catalog::TrainerSource;
use crate::error::TrainerError;
use crate::library;
use crate::status::StatusSink;

/// Commands accepted by the queue worker.
#[derive(Debug)]
enum QueueCommand {
    Enqueue(Box<DownloadRequest>),
    Shutdown,
}

/// Handle to the download queue worker.
#[derive(Debug, Clone)]
pub struct DownloadQueue {
    command_tx: mpsc::UnboundedSender<QueueCommand>,
    busy_rx: watch::Receiver<bool>,
}

impl DownloadQueue {
    /// Start the queue worker.
    ///
    /// `events` receives the per-task status lines; `reports` receives
    /// one [`TaskReport`] per terminal task, carrying the rebuilt
    /// library index.
    pub fn spawn(
        source: Arc<dyn TrainerSource>,
        events: StatusSink,
        reports: mpsc::UnboundedSender<TaskReport>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (busy_tx, busy_rx) = watch::channel(false);

        tokio::spawn(worker_loop(command_rx, source, events, reports, busy_tx));

        Self {
            command_tx,
            busy_rx,
        }
    }

    /// Append a request to the queue. If no task is active the worker
    /// picks it up immediately; re-enqueueing while busy simply appends.
    pub fn enqueue(&self, request: DownloadRequest) -> Result<(), TrainerError> {
        self.command_tx
            .send(QueueCommand::Enqueue(Box::new(request)))
            .map_err(|_| TrainerError::Validation("the download queue has shut down".into()))
    }

    /// True while a task is running or requests are waiting.
    pub fn is_busy(&self) -> bool {
        *self.busy_rx.borrow()
    }

    /// Wait until the queue is fully drained and no task is running.
    pub async fn idle(&self) {
        let mut rx = self.busy_rx.clone();
        loop {
            if !*rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Stop the worker. Requests still queued are dropped.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(QueueCommand::Shutdown);
    }
}

async fn worker_loop(
    mut command_rx: mpsc::UnboundedReceiver<QueueCommand>,
    source: Arc<dyn TrainerSource>,
    events: StatusSink,
    reports: mpsc::UnboundedSender<TaskReport>,
    busy_tx: watch::Sender<bool>,
) {
    let mut queue: VecDeque<DownloadRequest> = VecDeque::new();

    'outer: loop {
        // Absorb whatever has arrived, keeping arrival order.
        loop {
            match command_rx.try_recv() {
                Ok(QueueCommand::Enqueue(request)) => queue.push_back(*request),
                Ok(QueueCommand::Shutdown) => break 'outer,
                Err(_) => break,
            }
        }

        let Some(request) = queue.pop_front() else {
            // Idle: the busy flag drops and the worker parks until the
            // next command.
            let _ = busy_tx.send(false);
            match command_rx.recv().await {
                Some(QueueCommand::Enqueue(request)) => {
                    queue.push_back(*request);
                    continue;
                }
                Some(QueueCommand::Shutdown) | None => break,
            }
        };

        let _ = busy_tx.send(true);
        tracing::info!(trainer = %request.entry.name, "download task starting");

        let outcome = task::run(&request, source.as_ref(), &events).await;

        // Terminal state, success or failure: rebuild the library index
        // and hand both to the listener, then keep draining.
        let library = match library::rescan(&request.destination) {
            Ok(index) => index,
            Err(err) => {
                tracing::warn!("library rescan after download failed: {err}");
                library::LibraryIndex::new()
            }
        };

        let _ = reports.send(TaskReport {
            name: request.entry.name.clone(),
            outcome,
            library,
            finished_at: Utc::now(),
        });
    }

    let _ = busy_tx.send(false);
}
