// src/backend/mod.rs
pub mod rest;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::admin::AdminAccount;
use crate::models::announcement::{Announcement, AnnouncementDraft};
use crate::models::social::SocialStat;
use crate::models::ticket::{SupportTicket, TicketReply, TicketStatus};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Transport(String),
    #[error("Backend answered {0}: {1}")]
    Status(u16, String),
    #[error("Could not decode backend response: {0}")]
    Decode(String),
    #[error("{0} not found")]
    NotFound(String),
}

impl BackendError {
    /// The backend could not be reached or failed on its side, as opposed to
    /// rejecting the request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(code, _) => *code >= 500,
            Self::Decode(_) | Self::NotFound(_) => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Realtime row-change events pushed to listeners.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    AnnouncementInserted(Announcement),
    AnnouncementUpdated(Announcement),
    AnnouncementDeleted(String),
}

/// Fan-out channel for change events.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(128);
        Self { sender }
    }

    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Row fields written when a ticket is created.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TicketRow {
    pub subject: String,
    pub message: String,
    pub user_name: String,
    pub user_email: String,
    pub status: TicketStatus,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ReplyRow {
    pub ticket_id: String,
    pub message: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// The hosted row store, its change channel and its serverless functions.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn insert_ticket(&self, row: &TicketRow) -> Result<SupportTicket, BackendError>;
    async fn list_tickets(&self) -> Result<Vec<SupportTicket>, BackendError>;
    async fn get_ticket(&self, id: &str) -> Result<Option<SupportTicket>, BackendError>;
    async fn update_ticket_status(&self, id: &str, status: TicketStatus) -> Result<SupportTicket, BackendError>;
    async fn insert_reply(&self, row: &ReplyRow) -> Result<TicketReply, BackendError>;
    async fn list_replies(&self, ticket_id: &str) -> Result<Vec<TicketReply>, BackendError>;

    async fn list_announcements(&self, published_only: bool) -> Result<Vec<Announcement>, BackendError>;
    async fn insert_announcement(&self, draft: &AnnouncementDraft) -> Result<Announcement, BackendError>;
    async fn update_announcement(&self, id: &str, draft: &AnnouncementDraft) -> Result<Announcement, BackendError>;
    async fn set_announcement_published(&self, id: &str, published: bool) -> Result<Announcement, BackendError>;
    async fn delete_announcement(&self, id: &str) -> Result<(), BackendError>;

    async fn find_admin(&self, email: &str) -> Result<Option<AdminAccount>, BackendError>;

    async fn social_stats(&self) -> Result<Vec<SocialStat>, BackendError>;
    async fn refresh_social_stats(&self) -> Result<Vec<SocialStat>, BackendError>;

    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}
