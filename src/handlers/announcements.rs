// src/handlers/announcements.rs
use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::announcements::AnnouncementFeed;
use crate::utils::RequestError;

#[derive(Deserialize)]
pub struct PageQuery {
    page: Option<usize>,
}

pub async fn list_announcements(
    feed: web::Data<AnnouncementFeed>,
    query: web::Query<PageQuery>,
) -> HttpResponse {
    let page = feed.page(query.page.unwrap_or(1));
    HttpResponse::Ok().json(serde_json::json!({
        "page": page,
        "unread": feed.unread_count(),
    }))
}

pub async fn mark_viewed(feed: web::Data<AnnouncementFeed>) -> Result<HttpResponse, RequestError> {
    let at = feed.mark_viewed()?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "last_viewed": at })))
}
