pub mod admin;
pub mod announcements;
pub mod index;
pub mod preferences;
pub mod social;
pub mod status;
pub mod tickets;

use actix_web::web;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::RateLimiter;
use std::net::IpAddr;

pub type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Limits ticket submissions per client IP.
pub struct TicketLimiter(pub KeyedLimiter);

/// Limits admin login attempts per client IP.
pub struct LoginLimiter(pub KeyedLimiter);

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index::index))
        .route("/api/status", web::get().to(status::get_status))
        .route("/api/notifications", web::get().to(status::get_notifications))
        .route("/api/preferences", web::get().to(preferences::get_preferences))
        .route("/api/preferences/language", web::put().to(preferences::set_language))
        .route("/api/preferences/theme/toggle", web::post().to(preferences::toggle_theme))
        .route("/api/i18n/{key}", web::get().to(preferences::translate))
        .route("/api/tickets", web::post().to(tickets::submit_ticket))
        .route("/api/announcements", web::get().to(announcements::list_announcements))
        .route("/api/announcements/viewed", web::post().to(announcements::mark_viewed))
        .route("/api/social", web::get().to(social::social_stats))
        .service(
            web::scope("/admin")
                .route("/login", web::post().to(admin::login))
                .route("/logout", web::post().to(admin::logout))
                .route("/dashboard", web::get().to(admin::dashboard))
                .route("/tickets", web::get().to(admin::list_tickets))
                .route("/tickets/sync", web::post().to(admin::sync_tickets))
                .route("/tickets/{id}", web::get().to(admin::get_ticket))
                .route("/tickets/{id}", web::delete().to(admin::delete_ticket))
                .route("/tickets/{id}/status", web::put().to(admin::set_ticket_status))
                .route("/tickets/{id}/replies", web::post().to(admin::reply_ticket))
                .route("/announcements", web::get().to(admin::list_announcements))
                .route("/announcements", web::post().to(admin::create_announcement))
                .route("/announcements/{id}", web::put().to(admin::update_announcement))
                .route("/announcements/{id}", web::delete().to(admin::delete_announcement))
                .route("/announcements/{id}/published", web::put().to(admin::set_published))
                .route("/social/refresh", web::post().to(admin::refresh_social)),
        );
}
