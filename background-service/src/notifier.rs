use crate::subscriber::StatusSubscriber;
use deskalert_core::{StatusEvent, StatusKind};
use notify_rust::Notification;
use tracing::{debug, warn};

/// Pops a desktop notification for every keyword match.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new("Deskalert")
    }
}

impl DesktopNotifier {
    /// The notification to show for `event`, if any. Only matches notify.
    fn notification_for(&self, event: &StatusEvent) -> Option<Notification> {
        if event.kind != StatusKind::KeywordMatch {
            return None;
        }
        let mut notification = Notification::new();
        notification
            .appname(&self.app_name)
            .summary("Alert matched")
            .body(&event.message);
        Some(notification)
    }
}

impl StatusSubscriber for DesktopNotifier {
    fn on_status(&self, event: &StatusEvent) {
        let Some(notification) = self.notification_for(event) else {
            return;
        };

        let show = move || match notification.show() {
            Ok(_) => debug!("Desktop notification shown"),
            Err(e) => warn!("Failed to show desktop notification: {}", e),
        };

        // Showing a notification can block on the session bus
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(show);
            }
            Err(_) => show(),
        }
    }
}
