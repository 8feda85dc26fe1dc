// src/storage/memory.rs
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::broadcast;

use crate::backend::{BackendError, ChangeEvent, ChangeFeed, RemoteBackend, ReplyRow, TicketRow};
use crate::models::admin::AdminAccount;
use crate::models::announcement::{Announcement, AnnouncementDraft};
use crate::models::social::SocialStat;
use crate::models::ticket::{SupportTicket, TicketReply, TicketStatus};

/// In-process stand-in for the hosted backend, used when no backend URL is
/// configured.
pub struct MemoryBackend {
    tickets: DashMap<String, SupportTicket>,
    replies: DashMap<String, Vec<TicketReply>>,
    announcements: DashMap<String, Announcement>,
    admins: DashMap<String, AdminAccount>,
    social: DashMap<String, SocialStat>,
    feed: ChangeFeed,
    available: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tickets: DashMap::new(),
            replies: DashMap::new(),
            announcements: DashMap::new(),
            admins: DashMap::new(),
            social: DashMap::new(),
            feed: ChangeFeed::new(),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn add_admin(&self, email: &str, password_hash: String) {
        let account = AdminAccount {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_lowercase(),
            password_hash,
        };
        self.admins.insert(account.email.clone(), account);
    }

    #[cfg(test)]
    pub fn set_social_stat(&self, platform: &str, followers: u64, url: Option<String>) {
        self.social.insert(
            platform.to_string(),
            SocialStat {
                platform: platform.to_string(),
                followers,
                url,
                updated_at: Utc::now(),
            },
        );
    }

    #[cfg(test)]
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Transport("memory backend unavailable".into()))
        }
    }

    fn newest_first<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
    where
        F: Fn(&T) -> chrono::DateTime<Utc>,
    {
        items.sort_by(|a, b| key(b).cmp(&key(a)));
        items
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn insert_ticket(&self, row: &TicketRow) -> Result<SupportTicket, BackendError> {
        self.check()?;
        let now = Utc::now();
        let ticket = SupportTicket {
            id: uuid::Uuid::new_v4().to_string(),
            subject: row.subject.clone(),
            message: row.message.clone(),
            user_name: row.user_name.clone(),
            user_email: row.user_email.clone(),
            status: row.status,
            created_at: now,
            updated_at: now,
        };
        self.tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(ticket)
    }

    async fn list_tickets(&self) -> Result<Vec<SupportTicket>, BackendError> {
        self.check()?;
        let tickets: Vec<SupportTicket> = self.tickets.iter().map(|r| r.value().clone()).collect();
        Ok(Self::newest_first(tickets, |t: &SupportTicket| t.created_at))
    }

    async fn get_ticket(&self, id: &str) -> Result<Option<SupportTicket>, BackendError> {
        self.check()?;
        Ok(self.tickets.get(id).map(|r| r.value().clone()))
    }

    async fn update_ticket_status(&self, id: &str, status: TicketStatus) -> Result<SupportTicket, BackendError> {
        self.check()?;
        let mut entry = self
            .tickets
            .get_mut(id)
            .ok_or_else(|| BackendError::NotFound(format!("ticket {}", id)))?;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn insert_reply(&self, row: &ReplyRow) -> Result<TicketReply, BackendError> {
        self.check()?;
        if !self.tickets.contains_key(&row.ticket_id) {
            return Err(BackendError::NotFound(format!("ticket {}", row.ticket_id)));
        }
        let reply = TicketReply {
            id: uuid::Uuid::new_v4().to_string(),
            ticket_id: row.ticket_id.clone(),
            message: row.message.clone(),
            is_admin: row.is_admin,
            author: row.author.clone(),
            created_at: Utc::now(),
        };
        self.replies
            .entry(row.ticket_id.clone())
            .or_default()
            .push(reply.clone());
        Ok(reply)
    }

    async fn list_replies(&self, ticket_id: &str) -> Result<Vec<TicketReply>, BackendError> {
        self.check()?;
        Ok(self
            .replies
            .get(ticket_id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn list_announcements(&self, published_only: bool) -> Result<Vec<Announcement>, BackendError> {
        self.check()?;
        let items: Vec<Announcement> = self
            .announcements
            .iter()
            .filter(|r| !published_only || r.value().is_published)
            .map(|r| r.value().clone())
            .collect();
        Ok(Self::newest_first(items, |a: &Announcement| a.created_at))
    }

    async fn insert_announcement(&self, draft: &AnnouncementDraft) -> Result<Announcement, BackendError> {
        self.check()?;
        let now = Utc::now();
        let announcement = Announcement {
            id: uuid::Uuid::new_v4().to_string(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            image_url: draft.image_url.clone(),
            video_url: draft.video_url.clone(),
            is_published: draft.is_published,
            created_at: now,
            updated_at: now,
        };
        self.announcements.insert(announcement.id.clone(), announcement.clone());
        self.feed.publish(ChangeEvent::AnnouncementInserted(announcement.clone()));
        Ok(announcement)
    }

    async fn update_announcement(&self, id: &str, draft: &AnnouncementDraft) -> Result<Announcement, BackendError> {
        self.check()?;
        let mut entry = self
            .announcements
            .get_mut(id)
            .ok_or_else(|| BackendError::NotFound(format!("announcement {}", id)))?;
        entry.title = draft.title.clone();
        entry.content = draft.content.clone();
        entry.image_url = draft.image_url.clone();
        entry.video_url = draft.video_url.clone();
        entry.is_published = draft.is_published;
        entry.updated_at = Utc::now();
        let announcement = entry.clone();
        drop(entry);
        self.feed.publish(ChangeEvent::AnnouncementUpdated(announcement.clone()));
        Ok(announcement)
    }

    async fn set_announcement_published(&self, id: &str, published: bool) -> Result<Announcement, BackendError> {
        self.check()?;
        let mut entry = self
            .announcements
            .get_mut(id)
            .ok_or_else(|| BackendError::NotFound(format!("announcement {}", id)))?;
        entry.is_published = published;
        entry.updated_at = Utc::now();
        let announcement = entry.clone();
        drop(entry);
        self.feed.publish(ChangeEvent::AnnouncementUpdated(announcement.clone()));
        Ok(announcement)
    }

    async fn delete_announcement(&self, id: &str) -> Result<(), BackendError> {
        self.check()?;
        match self.announcements.remove(id) {
            Some(_) => {
                self.feed.publish(ChangeEvent::AnnouncementDeleted(id.to_string()));
                Ok(())
            }
            None => Err(BackendError::NotFound(format!("announcement {}", id))),
        }
    }

    async fn find_admin(&self, email: &str) -> Result<Option<AdminAccount>, BackendError> {
        self.check()?;
        Ok(self.admins.get(&email.to_lowercase()).map(|r| r.value().clone()))
    }

    async fn social_stats(&self) -> Result<Vec<SocialStat>, BackendError> {
        self.check()?;
        let mut stats: Vec<SocialStat> = self.social.iter().map(|r| r.value().clone()).collect();
        stats.sort_by(|a, b| a.platform.cmp(&b.platform));
        Ok(stats)
    }

    async fn refresh_social_stats(&self) -> Result<Vec<SocialStat>, BackendError> {
        self.check()?;
        let now = Utc::now();
        for mut entry in self.social.iter_mut() {
            entry.updated_at = now;
        }
        self.social_stats().await
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str, published: bool) -> AnnouncementDraft {
        AnnouncementDraft {
            title: title.into(),
            content: "body".into(),
            is_published: published,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn published_filter_and_order() {
        let backend = MemoryBackend::new();
        backend.insert_announcement(&draft("first", true)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        backend.insert_announcement(&draft("hidden", false)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        backend.insert_announcement(&draft("second", true)).await.unwrap();

        let published = backend.list_announcements(true).await.unwrap();
        let titles: Vec<_> = published.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);
        assert_eq!(backend.list_announcements(false).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn mutations_publish_change_events() {
        let backend = MemoryBackend::new();
        let mut rx = backend.changes();
        let a = backend.insert_announcement(&draft("news", true)).await.unwrap();
        backend.delete_announcement(&a.id).await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), ChangeEvent::AnnouncementInserted(_)));
        match rx.recv().await.unwrap() {
            ChangeEvent::AnnouncementDeleted(id) => assert_eq!(id, a.id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn unavailable_backend_fails_every_call() {
        let backend = MemoryBackend::new();
        backend.set_available(false);
        assert!(matches!(
            backend.list_tickets().await,
            Err(BackendError::Transport(_))
        ));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn admin_lookup_is_case_insensitive() {
        let backend = MemoryBackend::new();
        backend.add_admin("Admin@KindreD.gg", "hash".into());
        let found = backend.find_admin("admin@kindred.gg").await.unwrap();
        assert_eq!(found.unwrap().email, "admin@kindred.gg");
    }
}
