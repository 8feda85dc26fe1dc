// src/notify.rs
use chrono::{DateTime, Utc};
use log::{error, info};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
    Info,
}

/// A transient toast shown to site visitors. Also logged.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    pub at: DateTime<Utc>,
}

pub struct Notifier {
    recent: RwLock<VecDeque<Notification>>,
    history: usize,
}

impl Notifier {
    pub fn new(history: usize) -> Self {
        Self {
            recent: RwLock::new(VecDeque::with_capacity(history)),
            history,
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(Level::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Level::Error, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Level::Info, message.into());
    }

    /// Most recent first.
    pub fn recent(&self) -> Vec<Notification> {
        self.recent.read().iter().rev().cloned().collect()
    }

    fn push(&self, level: Level, message: String) {
        match level {
            Level::Error => error!("notification: {}", message),
            _ => info!("notification: {}", message),
        }

        let notification = Notification {
            level,
            message,
            at: Utc::now(),
        };

        if self.history == 0 {
            return;
        }
        let mut recent = self.recent.write();
        if recent.len() >= self.history {
            recent.pop_front();
        }
        recent.push_back(notification);
    }
}
