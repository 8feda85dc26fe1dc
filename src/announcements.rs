// src/announcements.rs
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::backend::{BackendError, ChangeEvent, RemoteBackend};
use crate::models::announcement::{Announcement, AnnouncementDraft, AnnouncementPage};
use crate::notify::Notifier;
use crate::storage::local::{self, LocalStorage, StorageError};

#[derive(Debug, Error)]
pub enum AnnouncementError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Announcement {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Backend(BackendError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<BackendError> for AnnouncementError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(what) => Self::NotFound(what),
            other => Self::Backend(other),
        }
    }
}

/// Published announcements, cached and paged in memory.
pub struct AnnouncementFeed {
    backend: Arc<dyn RemoteBackend>,
    storage: Arc<LocalStorage>,
    notifier: Arc<Notifier>,
    page_size: usize,
    cache: RwLock<Vec<Announcement>>,
}

impl AnnouncementFeed {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        storage: Arc<LocalStorage>,
        notifier: Arc<Notifier>,
        page_size: usize,
    ) -> Self {
        Self {
            backend,
            storage,
            notifier,
            page_size: page_size.max(1),
            cache: RwLock::new(Vec::new()),
        }
    }

    /// Refetches every published announcement, newest first.
    pub async fn refresh(&self) -> Result<usize, AnnouncementError> {
        let mut items = match self.backend.list_announcements(true).await {
            Ok(items) => items,
            Err(e) => {
                error!("Failed to fetch announcements: {}", e);
                self.notifier.error("Could not load announcements");
                return Err(e.into());
            }
        };
        items.retain(|a| a.is_published);
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let count = items.len();
        *self.cache.write() = items;
        debug!("Announcement feed holds {} entries", count);
        Ok(count)
    }

    /// 1-based page of the cached list.
    pub fn page(&self, page: usize) -> AnnouncementPage {
        let cache = self.cache.read();
        let total = cache.len();
        let total_pages = (total + self.page_size - 1) / self.page_size;
        let page = page.max(1);
        let start = (page - 1).saturating_mul(self.page_size);
        let items = cache
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();
        AnnouncementPage {
            items,
            page,
            page_size: self.page_size,
            total,
            total_pages,
        }
    }

    pub fn last_viewed(&self) -> Option<DateTime<Utc>> {
        self.storage.get::<DateTime<Utc>>(local::LAST_VIEWED_ANNOUNCEMENT)
    }

    pub fn unread_count(&self) -> usize {
        let cache = self.cache.read();
        match self.last_viewed() {
            Some(seen) => cache.iter().filter(|a| a.created_at > seen).count(),
            None => cache.len(),
        }
    }

    pub fn mark_viewed(&self) -> Result<DateTime<Utc>, AnnouncementError> {
        let now = Utc::now();
        self.storage.set(local::LAST_VIEWED_ANNOUNCEMENT, &now)?;
        Ok(now)
    }

    /// Refetches the whole list whenever an announcement changes remotely.
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let feed = Arc::clone(self);
        let mut changes = self.backend.changes();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) => {
                        match &event {
                            ChangeEvent::AnnouncementInserted(a) => debug!("Announcement {} inserted, refetching", a.id),
                            ChangeEvent::AnnouncementUpdated(a) => debug!("Announcement {} updated, refetching", a.id),
                            ChangeEvent::AnnouncementDeleted(id) => debug!("Announcement {} deleted, refetching", id),
                        }
                        if feed.refresh().await.is_ok() {
                            if let ChangeEvent::AnnouncementInserted(a) = &event {
                                if a.is_published {
                                    feed.notifier.info(format!("New announcement: {}", a.title));
                                }
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Announcement listener skipped {} events, refetching", n);
                        let _ = feed.refresh().await;
                    }
                    Err(RecvError::Closed) => {
                        info!("Change feed closed, announcement listener exiting");
                        break;
                    }
                }
            }
        })
    }

    fn validate(draft: &AnnouncementDraft) -> Result<(), AnnouncementError> {
        if draft.title.trim().is_empty() {
            return Err(AnnouncementError::Missing("Title"));
        }
        if draft.content.trim().is_empty() {
            return Err(AnnouncementError::Missing("Content"));
        }
        Ok(())
    }

    pub async fn list_all(&self) -> Result<Vec<Announcement>, AnnouncementError> {
        Ok(self.backend.list_announcements(false).await?)
    }

    pub async fn create(&self, draft: AnnouncementDraft) -> Result<Announcement, AnnouncementError> {
        Self::validate(&draft)?;
        let announcement = self.backend.insert_announcement(&draft).await?;
        info!("Created announcement {} ({})", announcement.id, announcement.title);
        Ok(announcement)
    }

    pub async fn update(&self, id: &str, draft: AnnouncementDraft) -> Result<Announcement, AnnouncementError> {
        Self::validate(&draft)?;
        let announcement = self.backend.update_announcement(id, &draft).await?;
        info!("Updated announcement {}", id);
        Ok(announcement)
    }

    pub async fn set_published(&self, id: &str, published: bool) -> Result<Announcement, AnnouncementError> {
        let announcement = self.backend.set_announcement_published(id, published).await?;
        info!("Announcement {} published={}", id, published);
        Ok(announcement)
    }

    pub async fn delete(&self, id: &str) -> Result<(), AnnouncementError> {
        self.backend.delete_announcement(id).await?;
        info!("Deleted announcement {}", id);
        Ok(())
    }

    #[cfg(test)]
    pub fn total_published(&self) -> usize {
        self.cache.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBackend;
    use std::time::Duration;

    fn feed(page_size: usize) -> (Arc<AnnouncementFeed>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let feed = Arc::new(AnnouncementFeed::new(
            backend.clone(),
            Arc::new(LocalStorage::in_memory()),
            Arc::new(Notifier::new(10)),
            page_size,
        ));
        (feed, backend)
    }

    fn draft(title: &str, published: bool) -> AnnouncementDraft {
        AnnouncementDraft {
            title: title.into(),
            content: "details".into(),
            is_published: published,
            ..Default::default()
        }
    }

    async fn seed(feed: &AnnouncementFeed, n: usize) {
        for i in 0..n {
            feed.create(draft(&format!("post {}", i), true)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    #[tokio::test]
    async fn pages_newest_first() {
        let (feed, _) = feed(2);
        seed(&feed, 5).await;
        feed.create(draft("draft", false)).await.unwrap();
        feed.refresh().await.unwrap();

        let first = feed.page(1);
        assert_eq!(first.total, 5);
        assert_eq!(first.total_pages, 3);
        let titles: Vec<_> = first.items.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["post 4", "post 3"]);

        let last = feed.page(3);
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].title, "post 0");

        let beyond = feed.page(9);
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_pages, 3);
    }

    #[tokio::test]
    async fn push_event_triggers_refetch() {
        let (feed, backend) = feed(6);
        let listener = feed.listen();
        assert_eq!(feed.total_published(), 0);

        backend.insert_announcement(&draft("Patch notes", true)).await.unwrap();

        let mut waited = 0;
        while feed.total_published() == 0 && waited < 50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        assert_eq!(feed.page(1).items[0].title, "Patch notes");
        listener.abort();
    }

    #[tokio::test]
    async fn unread_tracks_last_view() {
        let (feed, _) = feed(6);
        seed(&feed, 2).await;
        feed.refresh().await.unwrap();
        assert_eq!(feed.unread_count(), 2);

        feed.mark_viewed().unwrap();
        assert_eq!(feed.unread_count(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        feed.create(draft("fresh", true)).await.unwrap();
        feed.refresh().await.unwrap();
        assert_eq!(feed.unread_count(), 1);
    }

    #[tokio::test]
    async fn drafts_need_title_and_content() {
        let (feed, backend) = feed(6);
        let err = feed.create(draft("  ", true)).await.unwrap_err();
        assert!(matches!(err, AnnouncementError::Missing("Title")));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn unpublish_hides_from_feed() {
        let (feed, _) = feed(6);
        let a = feed.create(draft("visible", true)).await.unwrap();
        feed.refresh().await.unwrap();
        assert_eq!(feed.total_published(), 1);

        feed.set_published(&a.id, false).await.unwrap();
        feed.refresh().await.unwrap();
        assert_eq!(feed.total_published(), 0);
        assert_eq!(feed.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_missing_announcement_is_not_found() {
        let (feed, _) = feed(6);
        assert!(matches!(
            feed.delete("nope").await,
            Err(AnnouncementError::NotFound(_))
        ));
    }
}
