//! User-facing notifications.
//!
//! The pipeline reports its final verdict through a [`NotificationSink`]:
//! one danger notification for a rejected row or a rolled back import, one
//! success notification for a committed import. Sinks are fire-and-forget.
//!
//! - [`BroadcastSink`] fans notifications out to SSE clients (see
//!   [`crate::api::server`]) and prints them.
//! - [`CollectingSink`] keeps them in memory for the CLI report and tests.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Danger,
}

/// A notification shown to the user who started the import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub body: String,
    /// Stays on screen until dismissed
    pub persistent: bool,
}

impl Notification {
    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { severity: Severity::Success, title: title.into(), body: body.into(), persistent: false }
    }

    pub fn danger(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { severity: Severity::Danger, title: title.into(), body: body.into(), persistent: false }
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// Receives notifications.
pub trait NotificationSink: Send + Sync {
    fn send(&self, notification: Notification);
}

// =============================================================================
// Message catalogue
// =============================================================================

/// Titles and bodies used by the pipeline.
pub mod messages {
    pub const IMPORT_FAILED_TITLE: &str = "Import failed";
    pub const IMPORT_SUCCEEDED_TITLE: &str = "Import succeeded";

    /// A row failed validation.
    pub fn validation_failed(line: usize, error: &str) -> String {
        format!("Validation failed on line {}: {}", line, error)
    }

    /// The transaction was rolled back.
    pub fn import_failed() -> String {
        "The import was cancelled and no records were saved.".to_string()
    }

    pub fn import_succeeded(count: usize, skipped: usize) -> String {
        format!("{} rows imported, {} skipped.", count, skipped)
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Global notification broadcaster.
pub static NOTIFICATIONS: Lazy<BroadcastSink> = Lazy::new(BroadcastSink::new);

/// Broadcasts notifications to every subscriber.
pub struct BroadcastSink {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Get a receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for BroadcastSink {
    fn send(&self, notification: Notification) {
        let prefix = match notification.severity {
            Severity::Success => "✅",
            Severity::Danger => "❌",
        };
        println!("{} {}: {}", prefix, notification.title, notification.body);

        // No subscriber is fine
        let _ = self.sender.send(notification);
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    received: Mutex<Vec<Notification>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Notification> {
        self.notifications().pop()
    }
}

impl NotificationSink for CollectingSink {
    fn send(&self, notification: Notification) {
        if let Ok(mut received) = self.received.lock() {
            received.push(notification);
        }
    }
}

/// Forwards to several sinks.
pub struct FanoutSink<'a> {
    sinks: Vec<&'a dyn NotificationSink>,
}

impl<'a> FanoutSink<'a> {
    pub fn new(sinks: Vec<&'a dyn NotificationSink>) -> Self {
        Self { sinks }
    }
}

impl NotificationSink for FanoutSink<'_> {
    fn send(&self, notification: Notification) {
        for sink in &self.sinks {
            sink.send(notification.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.send(Notification::danger("t", "b").persistent());
        sink.send(Notification::success("ok", "done"));

        let all = sink.notifications();
        assert_eq!(all.len(), 2);
        assert!(all[0].persistent);
        assert_eq!(sink.last().unwrap().severity, Severity::Success);
    }

    #[test]
    fn test_broadcast_reaches_subscriber() {
        let sink = BroadcastSink::new();
        let mut rx = sink.subscribe();
        sink.send(Notification::success("Import succeeded", "3 rows imported, 0 skipped."));
        let received = rx.try_recv().unwrap();
        assert_eq!(received.title, "Import succeeded");
    }

    #[test]
    fn test_fanout() {
        let a = CollectingSink::new();
        let b = CollectingSink::new();
        let fanout = FanoutSink::new(vec![&a as &dyn NotificationSink, &b]);
        fanout.send(Notification::danger("x", "y"));
        assert_eq!(a.notifications().len(), 1);
        assert_eq!(b.notifications().len(), 1);
    }

    #[test]
    fn test_messages() {
        assert_eq!(messages::import_succeeded(3, 1), "3 rows imported, 1 skipped.");
        assert!(messages::validation_failed(2, "The email field is required.").contains("line 2"));
    }
}
