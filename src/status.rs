// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Status reporting from background workers to the controlling task.
//!
//! Workers communicate exclusively through a channel of [`StatusEvent`]s;
//! the presentation layer (CLI here, a GUI elsewhere) consumes them and
//! decides how to render. Two shapes exist:
//!
//! - plain status lines with a severity, for the download list;
//! - a named status-widget lifecycle (`create` / `update` / `remove`),
//!   used by the periodic refresh jobs. The widget name doubles as the
//!   job-kind key, and `remove` is the job's single completion signal.

use tokio::sync::mpsc;

/// Severity of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Failure,
}

/// One human-readable progress line.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub text: String,
    pub severity: Severity,
}

/// Event stream consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// A plain status line.
    Line(StatusLine),
    /// A long-running named operation appeared.
    WidgetCreate { name: String, text: String },
    /// Progress or terminal text for a named operation.
    WidgetUpdate {
        name: String,
        text: String,
        state: Severity,
    },
    /// The named operation finished; the widget can be dropped.
    WidgetRemove { name: String },
}

/// Cloneable sender half handed to every worker.
///
/// Sends are infallible from the worker's point of view: if the consumer
/// went away the events are silently dropped, which is the correct
/// behavior during shutdown.
#[derive(Debug, Clone)]
pub struct StatusSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusSink {
    /// Create a sink plus the receiver for the controlling task.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }

    pub fn info(&self, text: impl Into<String>) {
        self.line(text, Severity::Info);
    }

    pub fn success(&self, text: impl Into<String>) {
        self.line(text, Severity::Success);
    }

    pub fn failure(&self, text: impl Into<String>) {
        self.line(text, Severity::Failure);
    }

    pub fn line(&self, text: impl Into<String>, severity: Severity) {
        self.send(StatusEvent::Line(StatusLine {
            text: text.into(),
            severity,
        }));
    }

    pub fn widget_create(&self, name: impl Into<String>, text: impl Into<String>) {
        self.send(StatusEvent::WidgetCreate {
            name: name.into(),
            text: text.into(),
        });
    }

    pub fn widget_update(
        &self,
        name: impl Into<String>,
        text: impl Into<String>,
        state: Severity,
    ) {
        self.send(StatusEvent::WidgetUpdate {
            name: name.into(),
            text: text.into(),
            state,
        });
    }

    pub fn widget_remove(&self, name: impl Into<String>) {
        self.send(StatusEvent::WidgetRemove { name: name.into() });
    }
}
