// src/state.rs
use actix_web::web;
use governor::RateLimiter;
use std::sync::Arc;

use crate::announcements::AnnouncementFeed;
use crate::auth::SessionStore;
use crate::backend::RemoteBackend;
use crate::config::Config;
use crate::handlers::{self, LoginLimiter, TicketLimiter};
use crate::notify::Notifier;
use crate::poller::StatusPoller;
use crate::preferences::PreferenceStore;
use crate::query::ServerQuery;
use crate::social::SocialStats;
use crate::storage::local::LocalStorage;
use crate::tickets::TicketService;

/// Everything the handlers share, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub notifier: web::Data<Notifier>,
    pub poller: web::Data<StatusPoller>,
    pub preferences: web::Data<PreferenceStore>,
    pub tickets: web::Data<TicketService>,
    pub feed: web::Data<AnnouncementFeed>,
    pub sessions: web::Data<SessionStore>,
    pub social: web::Data<SocialStats>,
    pub ticket_limiter: web::Data<TicketLimiter>,
    pub login_limiter: web::Data<LoginLimiter>,
}

impl AppState {
    pub fn new(
        config: &Config,
        backend: Arc<dyn RemoteBackend>,
        query: Arc<dyn ServerQuery>,
        storage: Arc<LocalStorage>,
    ) -> Self {
        let notifier = Arc::new(Notifier::new(config.notification_history));
        let poller = StatusPoller::new(query, Arc::clone(&notifier), config.poll_interval());
        let feed = AnnouncementFeed::new(
            Arc::clone(&backend),
            Arc::clone(&storage),
            Arc::clone(&notifier),
            config.announcements_page_size,
        );

        Self {
            poller: web::Data::new(poller),
            preferences: web::Data::new(PreferenceStore::load(Arc::clone(&storage))),
            tickets: web::Data::new(TicketService::new(Arc::clone(&backend), Arc::clone(&storage))),
            feed: web::Data::new(feed),
            sessions: web::Data::new(SessionStore::new(
                Arc::clone(&backend),
                Arc::clone(&storage),
                config.admin_session_ttl(),
            )),
            social: web::Data::new(SocialStats::new(backend, Arc::clone(&notifier))),
            notifier: web::Data::from(notifier),
            ticket_limiter: web::Data::new(TicketLimiter(RateLimiter::keyed(config.ticket_quota()))),
            login_limiter: web::Data::new(LoginLimiter(RateLimiter::keyed(config.login_quota()))),
        }
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.notifier.clone())
            .app_data(self.poller.clone())
            .app_data(self.preferences.clone())
            .app_data(self.tickets.clone())
            .app_data(self.feed.clone())
            .app_data(self.sessions.clone())
            .app_data(self.social.clone())
            .app_data(self.ticket_limiter.clone())
            .app_data(self.login_limiter.clone());
        handlers::routes(cfg);
    }
}
