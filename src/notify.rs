//! User-visible notifications (toasts in a UI, lines in a terminal).

use crate::era::Era;
use crate::error::{ErrorKind, TimeLensError};
use serde::Serialize;
use tokio::sync::mpsc;

/// How a notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Something finished as requested.
    Success,
    /// Something went wrong; the session is still usable.
    Failure,
}

/// A title/description pair shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Short headline.
    pub title: String,
    /// Longer explanation.
    pub description: String,
    /// Presentation hint.
    pub severity: Severity,
}

impl Notification {
    /// A scene was rendered for `era`.
    pub fn generated(era: &Era) -> Self {
        Self {
            title: "Image Generated!".into(),
            description: format!("Your scene has been created for the {} era.", era.label),
            severity: Severity::Success,
        }
    }

    /// A generation sequence failed with `error`.
    pub fn failed(error: &TimeLensError) -> Self {
        let title = match error.kind() {
            ErrorKind::MissingCredential => "API Key Required",
            ErrorKind::MissingBaseImage => "Modern Scene Required",
            ErrorKind::MissingImage => "Nothing to Download",
            ErrorKind::Service | ErrorKind::Transport => "Generation Failed",
        };
        Self {
            title: title.into(),
            description: error.notification_message(),
            severity: Severity::Failure,
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}

/// Fire-and-forget sink for notifications.
pub trait Notifier: Send + Sync {
    /// Delivers `notification`; never fails from the caller's point of view.
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Success => tracing::info!(
                title = %notification.title,
                "{}",
                notification.description
            ),
            Severity::Failure => tracing::warn!(
                title = %notification.title,
                "{}",
                notification.description
            ),
        }
    }
}

/// Forwards notifications over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiver its notifications arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::era::ERAS;

    #[test]
    fn test_generated_names_the_era() {
        let n = Notification::generated(&ERAS[4]);
        assert_eq!(n.severity, Severity::Success);
        assert!(n.description.contains("Modern"));
    }

    #[test]
    fn test_failed_titles_by_kind() {
        assert_eq!(
            Notification::failed(&TimeLensError::MissingCredential).title,
            "API Key Required"
        );
        assert_eq!(
            Notification::failed(&TimeLensError::MissingBaseImage).title,
            "Modern Scene Required"
        );
        assert_eq!(
            Notification::failed(&TimeLensError::MissingImage).title,
            "Nothing to Download"
        );
        let n = Notification::failed(&TimeLensError::Api {
            status: 429,
            message: "quota exceeded".into(),
        });
        assert_eq!(n.title, "Generation Failed");
        assert_eq!(n.description, "quota exceeded");
        assert_eq!(n.severity, Severity::Failure);
    }

    #[test]
    fn test_channel_notifier_delivers_and_tolerates_closed_receiver() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Notification::generated(&ERAS[0]));
        assert_eq!(rx.try_recv().unwrap().title, "Image Generated!");

        drop(rx);
        notifier.notify(Notification::generated(&ERAS[1]));
    }
}
