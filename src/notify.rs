//! Process-wide notification channel.
//!
//! Any component holding a `Notifier` may report; exactly one presenter owns the receiver.
//! The handle is passed explicitly, so mounting a second presenter cannot silently steal
//! reports from the first.

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn to_message(&self) -> String {
        match self.level {
            NoticeLevel::Info => self.message.clone(),
            NoticeLevel::Success => format!("OK: {}", self.message),
            NoticeLevel::Error => format!("Error: {}", self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: UnboundedSender<Notice>,
}

impl Notifier {
    pub fn channel() -> (Self, UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Reports after the presenter has gone away are dropped.
    pub fn report(&self, level: NoticeLevel, message: impl Into<String>) {
        let _ = self.tx.send(Notice {
            level,
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.report(NoticeLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.report(NoticeLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.report(NoticeLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_clone_reports_to_the_same_presenter() {
        let (notifier, mut rx) = Notifier::channel();
        let other = notifier.clone();
        notifier.info("loading");
        other.error("boom");
        assert_eq!(rx.try_recv().unwrap().message, "loading");
        let err = rx.try_recv().unwrap();
        assert_eq!(err.level, NoticeLevel::Error);
        assert_eq!(err.to_message(), "Error: boom");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn report_without_presenter_is_silent() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.success("saved");
    }
}
