// src/backend/rest.rs
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::broadcast;

use super::{BackendError, ChangeEvent, ChangeFeed, RemoteBackend, ReplyRow, TicketRow};
use crate::models::admin::AdminAccount;
use crate::models::announcement::{Announcement, AnnouncementDraft};
use crate::models::social::SocialStat;
use crate::models::ticket::{SupportTicket, TicketReply, TicketStatus};

const TICKETS: &str = "support_tickets";
const REPLIES: &str = "ticket_replies";
const ANNOUNCEMENTS: &str = "announcements";
const ADMINS: &str = "admin_users";
const SOCIAL: &str = "social_stats";
const REFRESH_SOCIAL_FUNCTION: &str = "refresh-social-stats";

/// Client for the hosted backend's REST row API and functions endpoint.
///
/// The hosted realtime socket is not consumed; change events are published
/// for writes made through this client.
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    feed: ChangeFeed,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            feed: ChangeFeed::new(),
        }
    }

    fn table(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn write(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.table(method, table).header("Prefer", "return=representation")
    }

    async fn rows<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<Vec<T>, BackendError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Backend returned {}: {}", status, body);
            return Err(BackendError::Status(status.as_u16(), body));
        }
        Ok(resp.json::<Vec<T>>().await?)
    }

    async fn one<T: DeserializeOwned>(&self, what: &str, req: reqwest::RequestBuilder) -> Result<T, BackendError> {
        self.rows::<T>(req)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(what.to_string()))
    }
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn insert_ticket(&self, row: &TicketRow) -> Result<SupportTicket, BackendError> {
        let ticket: SupportTicket = self
            .one("ticket", self.write(reqwest::Method::POST, TICKETS).json(row))
            .await?;
        debug!("Inserted ticket {}", ticket.id);
        Ok(ticket)
    }

    async fn list_tickets(&self) -> Result<Vec<SupportTicket>, BackendError> {
        self.rows(
            self.table(reqwest::Method::GET, TICKETS)
                .query(&[("select", "*"), ("order", "created_at.desc")]),
        )
        .await
    }

    async fn get_ticket(&self, id: &str) -> Result<Option<SupportTicket>, BackendError> {
        let rows: Vec<SupportTicket> = self
            .rows(
                self.table(reqwest::Method::GET, TICKETS)
                    .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_ticket_status(&self, id: &str, status: TicketStatus) -> Result<SupportTicket, BackendError> {
        self.one(
            &format!("ticket {}", id),
            self.write(reqwest::Method::PATCH, TICKETS)
                .query(&[("id", format!("eq.{}", id))])
                .json(&json!({ "status": status, "updated_at": Utc::now() })),
        )
        .await
    }

    async fn insert_reply(&self, row: &ReplyRow) -> Result<TicketReply, BackendError> {
        self.one("reply", self.write(reqwest::Method::POST, REPLIES).json(row)).await
    }

    async fn list_replies(&self, ticket_id: &str) -> Result<Vec<TicketReply>, BackendError> {
        self.rows(self.table(reqwest::Method::GET, REPLIES).query(&[
            ("select", "*".to_string()),
            ("ticket_id", format!("eq.{}", ticket_id)),
            ("order", "created_at.asc".to_string()),
        ]))
        .await
    }

    async fn list_announcements(&self, published_only: bool) -> Result<Vec<Announcement>, BackendError> {
        let mut req = self
            .table(reqwest::Method::GET, ANNOUNCEMENTS)
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        if published_only {
            req = req.query(&[("is_published", "eq.true")]);
        }
        self.rows(req).await
    }

    async fn insert_announcement(&self, draft: &AnnouncementDraft) -> Result<Announcement, BackendError> {
        let announcement: Announcement = self
            .one("announcement", self.write(reqwest::Method::POST, ANNOUNCEMENTS).json(draft))
            .await?;
        self.feed.publish(ChangeEvent::AnnouncementInserted(announcement.clone()));
        Ok(announcement)
    }

    async fn update_announcement(&self, id: &str, draft: &AnnouncementDraft) -> Result<Announcement, BackendError> {
        let mut body = serde_json::to_value(draft).map_err(|e| BackendError::Decode(e.to_string()))?;
        body["updated_at"] = json!(Utc::now());
        let announcement: Announcement = self
            .one(
                &format!("announcement {}", id),
                self.write(reqwest::Method::PATCH, ANNOUNCEMENTS)
                    .query(&[("id", format!("eq.{}", id))])
                    .json(&body),
            )
            .await?;
        self.feed.publish(ChangeEvent::AnnouncementUpdated(announcement.clone()));
        Ok(announcement)
    }

    async fn set_announcement_published(&self, id: &str, published: bool) -> Result<Announcement, BackendError> {
        let announcement: Announcement = self
            .one(
                &format!("announcement {}", id),
                self.write(reqwest::Method::PATCH, ANNOUNCEMENTS)
                    .query(&[("id", format!("eq.{}", id))])
                    .json(&json!({ "is_published": published, "updated_at": Utc::now() })),
            )
            .await?;
        self.feed.publish(ChangeEvent::AnnouncementUpdated(announcement.clone()));
        Ok(announcement)
    }

    async fn delete_announcement(&self, id: &str) -> Result<(), BackendError> {
        let deleted: Vec<Announcement> = self
            .rows(
                self.write(reqwest::Method::DELETE, ANNOUNCEMENTS)
                    .query(&[("id", format!("eq.{}", id))]),
            )
            .await?;
        if deleted.is_empty() {
            return Err(BackendError::NotFound(format!("announcement {}", id)));
        }
        self.feed.publish(ChangeEvent::AnnouncementDeleted(id.to_string()));
        Ok(())
    }

    async fn find_admin(&self, email: &str) -> Result<Option<AdminAccount>, BackendError> {
        let rows: Vec<AdminAccount> = self
            .rows(
                self.table(reqwest::Method::GET, ADMINS)
                    .query(&[("select", "*".to_string()), ("email", format!("eq.{}", email))]),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn social_stats(&self) -> Result<Vec<SocialStat>, BackendError> {
        self.rows(
            self.table(reqwest::Method::GET, SOCIAL)
                .query(&[("select", "*"), ("order", "platform.asc")]),
        )
        .await
    }

    async fn refresh_social_stats(&self) -> Result<Vec<SocialStat>, BackendError> {
        let resp = self
            .client
            .post(format!("{}/functions/v1/{}", self.base_url, REFRESH_SOCIAL_FUNCTION))
            .bearer_auth(&self.api_key)
            .json(&json!({}))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Social stats refresh failed with {}: {}", status, body);
            return Err(BackendError::Status(status.as_u16(), body));
        }
        info!("Social stats refresh function completed");
        self.social_stats().await
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}
