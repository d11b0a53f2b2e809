//! Transient status messages.
//!
//! One message at a time. A new message replaces the current one and restarts
//! the timer; expiry is checked by [`Notifier::expire`].

use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub id: u64,
    pub message: String,
    pub severity: Severity,
    #[serde(skip)]
    pub hide_at: Instant,
}

#[derive(Debug)]
pub struct Notifier {
    info_duration: Duration,
    error_duration: Duration,
    current: Option<Toast>,
    next_id: u64,
}

impl Notifier {
    pub fn new(info_duration: Duration, error_duration: Duration) -> Self {
        Self {
            info_duration,
            error_duration,
            current: None,
            next_id: 1,
        }
    }

    pub fn duration_for(&self, severity: Severity) -> Duration {
        match severity {
            Severity::Info => self.info_duration,
            Severity::Error => self.error_duration,
        }
    }

    /// Replace whatever is displayed with `message`.
    pub fn notify(&mut self, message: impl Into<String>, severity: Severity, now: Instant) -> &Toast {
        let toast = Toast {
            id: self.next_id,
            message: message.into(),
            severity,
            hide_at: now + self.duration_for(severity),
        };
        self.next_id += 1;
        match severity {
            Severity::Info => tracing::info!(id = toast.id, message = %toast.message, "notification"),
            Severity::Error => tracing::warn!(id = toast.id, message = %toast.message, "notification"),
        }
        self.current.insert(toast)
    }

    pub fn current(&self) -> Option<&Toast> {
        self.current.as_ref()
    }

    /// Hide the current message if its time is up. Returns the hidden toast.
    pub fn expire(&mut self, now: Instant) -> Option<Toast> {
        match &self.current {
            Some(toast) if now >= toast.hide_at => self.current.take(),
            _ => None,
        }
    }
}
