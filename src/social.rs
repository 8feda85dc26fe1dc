// src/social.rs
use log::{error, info};
use std::sync::Arc;

use crate::backend::{BackendError, RemoteBackend};
use crate::models::social::SocialStat;
use crate::notify::Notifier;

/// Follower counts shown in the community section.
pub struct SocialStats {
    backend: Arc<dyn RemoteBackend>,
    notifier: Arc<Notifier>,
}

impl SocialStats {
    pub fn new(backend: Arc<dyn RemoteBackend>, notifier: Arc<Notifier>) -> Self {
        Self { backend, notifier }
    }

    pub async fn stats(&self) -> Result<Vec<SocialStat>, BackendError> {
        self.backend.social_stats().await
    }

    /// Asks the backend function to pull fresh counts from each platform.
    pub async fn refresh(&self) -> Result<Vec<SocialStat>, BackendError> {
        match self.backend.refresh_social_stats().await {
            Ok(stats) => {
                info!("Refreshed {} social stats", stats.len());
                self.notifier.success("Social stats updated");
                Ok(stats)
            }
            Err(e) => {
                error!("Social stats refresh failed: {}", e);
                self.notifier.error("Could not refresh social stats");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Level;
    use crate::storage::memory::MemoryBackend;

    #[tokio::test]
    async fn refresh_reports_outcome() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_social_stat("discord", 1200, Some("https://discord.gg/kindred".into()));
        backend.set_social_stat("youtube", 300, None);
        let notifier = Arc::new(Notifier::new(5));
        let social = SocialStats::new(backend.clone(), Arc::clone(&notifier));

        let stats = social.refresh().await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].platform, "discord");
        assert_eq!(notifier.recent()[0].level, Level::Success);

        backend.set_available(false);
        assert!(social.refresh().await.is_err());
        assert_eq!(notifier.recent()[0].level, Level::Error);
    }
}
