//! Notifications emitted after each coordinator action.
//!
//! Notifications are observational: nothing in the core reads them back, and a
//! sink that fails to write never fails the action that produced it.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

pub const NOTIFICATION_SCHEMA_VERSION: &str = "shelf.notification.v1";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub schema_version: &'static str,
    pub kind: NotificationKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }

    fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            schema_version: NOTIFICATION_SCHEMA_VERSION,
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Receiver for coordinator notifications.
pub trait Notifier {
    fn notify(&mut self, notification: Notification);
}

/// Collects notifications in memory.
impl Notifier for Vec<Notification> {
    fn notify(&mut self, notification: Notification) {
        self.push(notification);
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&mut self, notification: Notification) {
        (**self).notify(notification);
    }
}

impl<N: Notifier + ?Sized> Notifier for &mut N {
    fn notify(&mut self, notification: Notification) {
        (**self).notify(notification);
    }
}

/// An absent sink drops everything.
impl<N: Notifier> Notifier for Option<N> {
    fn notify(&mut self, notification: Notification) {
        if let Some(inner) = self {
            inner.notify(notification);
        }
    }
}

/// Delivers to both sinks in order.
impl<A: Notifier, B: Notifier> Notifier for (A, B) {
    fn notify(&mut self, notification: Notification) {
        self.0.notify(notification.clone());
        self.1.notify(notification);
    }
}

/// Drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Notifier for Silent {
    fn notify(&mut self, _notification: Notification) {}
}

/// Forwards notifications to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&mut self, notification: Notification) {
        match notification.kind {
            NotificationKind::Success => tracing::info!(message = %notification.message, "notification"),
            NotificationKind::Error => tracing::warn!(message = %notification.message, "notification"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationDestination {
    Stdout,
    File(PathBuf),
}

impl NotificationDestination {
    /// `-` means stdout; blank means no destination.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(NotificationDestination::Stdout);
            }
            Some(NotificationDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<JsonlNotifier> {
        match self {
            NotificationDestination::Stdout => Ok(JsonlNotifier::stdout()),
            NotificationDestination::File(path) => JsonlNotifier::file(path),
        }
    }
}

/// Writes each notification as one JSON line.
pub struct JsonlNotifier {
    writer: Box<dyn Write + Send>,
}

impl JsonlNotifier {
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
        }
    }

    /// Append to `path`, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
        })
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }

    fn write_line(&mut self, notification: &Notification) -> Result<()> {
        let serialized = serde_json::to_vec(notification)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl Notifier for JsonlNotifier {
    fn notify(&mut self, notification: Notification) {
        if let Err(err) = self.write_line(&notification) {
            tracing::warn!(error = %err, "failed to write notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_parsing() {
        assert_eq!(NotificationDestination::parse(None), None);
        assert_eq!(NotificationDestination::parse(Some("  ")), None);
        assert_eq!(
            NotificationDestination::parse(Some("-")),
            Some(NotificationDestination::Stdout)
        );
        assert_eq!(
            NotificationDestination::parse(Some("events.jsonl")),
            Some(NotificationDestination::File(PathBuf::from("events.jsonl")))
        );
    }

    #[test]
    fn jsonl_file_sink_appends_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        let mut sink = JsonlNotifier::file(&path).expect("open");
        sink.notify(Notification::success("Book created successfully"));
        sink.notify(Notification::error("Failed to delete book"));

        let content = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "success");
        assert_eq!(lines[1]["kind"], "error");
        assert_eq!(lines[1]["message"], "Failed to delete book");
    }

    #[test]
    fn pair_delivers_to_both() {
        let mut pair: (Vec<Notification>, Vec<Notification>) = (Vec::new(), Vec::new());
        pair.notify(Notification::success("ok"));
        assert_eq!(pair.0.len(), 1);
        assert_eq!(pair.1.len(), 1);
    }
}
