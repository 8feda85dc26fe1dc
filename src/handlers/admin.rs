// src/handlers/admin.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, error, info, warn};
use serde::Deserialize;

use super::LoginLimiter;
use crate::announcements::AnnouncementFeed;
use crate::auth::SessionStore;
use crate::models::announcement::AnnouncementDraft;
use crate::models::ticket::TicketStatus;
use crate::poller::StatusPoller;
use crate::social::SocialStats;
use crate::tickets::TicketService;
use crate::utils::{bearer_token, extract_client_ip, require_admin, RequestError};

#[derive(Deserialize)]
pub struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct TicketFilter {
    status: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusBody {
    status: String,
}

#[derive(Deserialize)]
pub struct ReplyBody {
    message: String,
}

#[derive(Deserialize)]
pub struct PublishedBody {
    is_published: bool,
}

fn parse_status(raw: &str) -> Result<TicketStatus, RequestError> {
    raw.parse::<TicketStatus>().map_err(RequestError::Invalid)
}

pub async fn login(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    rate_limiter: web::Data<LoginLimiter>,
    body: web::Json<LoginBody>,
) -> Result<HttpResponse, RequestError> {
    let client_ip = extract_client_ip(&req)?;

    // Rate Limiting
    if rate_limiter.0.check_key(&client_ip).is_err() {
        error!("Rate limit exceeded for admin login from {}", client_ip);
        return Err(RequestError::RateLimitExceeded);
    }

    let session = sessions.login(&body.email, &body.password).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "token": session.token,
        "admin_id": session.admin_id,
        "email": session.email,
        "expires_at": session.expires_at,
    })))
}

pub async fn logout(req: HttpRequest, sessions: web::Data<SessionStore>) -> Result<HttpResponse, RequestError> {
    let session = require_admin(&req, &sessions)?;
    if let Some(token) = bearer_token(&req) {
        sessions.logout(token)?;
    }
    info!("Admin {} logged out", session.email);
    Ok(HttpResponse::NoContent().finish())
}

pub async fn dashboard(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    tickets: web::Data<TicketService>,
    feed: web::Data<AnnouncementFeed>,
    poller: web::Data<StatusPoller>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;

    let counts = tickets.counts().await?;
    let all = feed.list_all().await?;
    let published = all.iter().filter(|a| a.is_published).count();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "tickets": counts,
        "announcements": {
            "total": all.len(),
            "published": published,
            "drafts": all.len() - published,
        },
        "server": poller.view(),
    })))
}

pub async fn list_tickets(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    tickets: web::Data<TicketService>,
    query: web::Query<TicketFilter>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;
    let status = match query.status.as_deref() {
        Some(raw) if !raw.is_empty() => Some(parse_status(raw)?),
        _ => None,
    };
    let list = tickets.list(status).await?;
    debug!("Listing {} tickets", list.len());
    Ok(HttpResponse::Ok().json(list))
}

pub async fn get_ticket(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    tickets: web::Data<TicketService>,
    id: web::Path<String>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;
    let detail = tickets.get(&id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

pub async fn set_ticket_status(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    tickets: web::Data<TicketService>,
    id: web::Path<String>,
    body: web::Json<StatusBody>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;
    let status = parse_status(&body.status)?;
    let ticket = tickets.set_status(&id, status).await?;
    Ok(HttpResponse::Ok().json(ticket))
}

pub async fn reply_ticket(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    tickets: web::Data<TicketService>,
    id: web::Path<String>,
    body: web::Json<ReplyBody>,
) -> Result<HttpResponse, RequestError> {
    let session = require_admin(&req, &sessions)?;
    let stored = tickets.reply(&id, &body.message, Some(session.email)).await?;
    let durability = stored.durability();
    if !stored.is_remote() {
        warn!("Reply to ticket {} kept locally", id);
    }
    let outcome = stored.into_inner();
    Ok(HttpResponse::Created().json(serde_json::json!({
        "durability": durability,
        "reply": outcome.reply,
        "status": outcome.status,
        "ticket": outcome.ticket,
    })))
}

pub async fn delete_ticket(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    tickets: web::Data<TicketService>,
    id: web::Path<String>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;
    tickets.delete(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn sync_tickets(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    tickets: web::Data<TicketService>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;
    let report = tickets.sync_fallback().await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn list_announcements(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    feed: web::Data<AnnouncementFeed>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;
    Ok(HttpResponse::Ok().json(feed.list_all().await?))
}

pub async fn create_announcement(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    feed: web::Data<AnnouncementFeed>,
    body: web::Json<AnnouncementDraft>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;
    let announcement = feed.create(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(announcement))
}

pub async fn update_announcement(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    feed: web::Data<AnnouncementFeed>,
    id: web::Path<String>,
    body: web::Json<AnnouncementDraft>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;
    let announcement = feed.update(&id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(announcement))
}

pub async fn set_published(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    feed: web::Data<AnnouncementFeed>,
    id: web::Path<String>,
    body: web::Json<PublishedBody>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;
    let announcement = feed.set_published(&id, body.is_published).await?;
    Ok(HttpResponse::Ok().json(announcement))
}

pub async fn delete_announcement(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    feed: web::Data<AnnouncementFeed>,
    id: web::Path<String>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;
    feed.delete(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn refresh_social(
    req: HttpRequest,
    sessions: web::Data<SessionStore>,
    social: web::Data<SocialStats>,
) -> Result<HttpResponse, RequestError> {
    require_admin(&req, &sessions)?;
    let stats = social.refresh().await?;
    Ok(HttpResponse::Ok().json(stats))
}
