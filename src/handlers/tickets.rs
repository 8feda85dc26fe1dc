// src/handlers/tickets.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, error, warn};

use super::TicketLimiter;
use crate::models::ticket::NewTicket;
use crate::tickets::TicketService;
use crate::utils::{extract_client_ip, RequestError};

pub async fn submit_ticket(
    req: HttpRequest,
    tickets: web::Data<TicketService>,
    rate_limiter: web::Data<TicketLimiter>,
    form: web::Json<NewTicket>,
) -> Result<HttpResponse, RequestError> {
    let client_ip = extract_client_ip(&req)?;

    // Rate Limiting
    if rate_limiter.0.check_key(&client_ip).is_err() {
        error!("Rate limit exceeded for ticket submission from {}", client_ip);
        return Err(RequestError::RateLimitExceeded);
    }

    let stored = tickets.submit(form.into_inner()).await?;
    if stored.is_remote() {
        debug!("Ticket {} stored remotely", stored.get().id);
    } else {
        warn!("Ticket {} only stored locally", stored.get().id);
    }

    let durability = stored.durability();
    Ok(HttpResponse::Created().json(serde_json::json!({
        "durability": durability,
        "ticket": stored.into_inner(),
    })))
}
