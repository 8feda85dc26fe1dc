// src/utils.rs
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use log::debug;
use std::net::IpAddr;
use thiserror::Error;

use crate::announcements::AnnouncementError;
use crate::auth::{AuthError, SessionStore};
use crate::backend::BackendError;
use crate::models::admin::AdminSession;
use crate::storage::local::StorageError;
use crate::tickets::TicketError;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Failed to extract client IP")]
    MissingPeerIP,
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    NotAllowed(String),
    #[error("Backend unavailable: {0}")]
    Upstream(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for RequestError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::RateLimitExceeded => HttpResponse::TooManyRequests().body(self.to_string()),
            Self::Unauthorized(_) => HttpResponse::Unauthorized().body(self.to_string()),
            Self::NotFound(_) => HttpResponse::NotFound().body(self.to_string()),
            Self::NotAllowed(_) => HttpResponse::MethodNotAllowed().body(self.to_string()),
            Self::Upstream(_) => HttpResponse::BadGateway().body(self.to_string()),
            Self::Internal(_) => HttpResponse::InternalServerError().body(self.to_string()),
            _ => HttpResponse::BadRequest().body(self.to_string()),
        }
    }
}

impl From<BackendError> for RequestError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(what) => Self::NotFound(format!("{} not found", what)),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<StorageError> for RequestError {
    fn from(e: StorageError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<TicketError> for RequestError {
    fn from(e: TicketError) -> Self {
        match e {
            TicketError::Missing(_) => Self::Invalid(e.to_string()),
            TicketError::NotFound(_) => Self::NotFound(e.to_string()),
            TicketError::Unsupported => Self::NotAllowed(e.to_string()),
            TicketError::Backend(b) => b.into(),
            TicketError::Storage(s) => s.into(),
        }
    }
}

impl From<AnnouncementError> for RequestError {
    fn from(e: AnnouncementError) -> Self {
        match e {
            AnnouncementError::Missing(_) => Self::Invalid(e.to_string()),
            AnnouncementError::NotFound(_) => Self::NotFound(e.to_string()),
            AnnouncementError::Backend(b) => b.into(),
            AnnouncementError::Storage(s) => s.into(),
        }
    }
}

impl From<AuthError> for RequestError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Backend(b) => b.into(),
            AuthError::Hash(msg) => Self::Internal(msg),
            other => Self::Unauthorized(other.to_string()),
        }
    }
}

pub fn extract_client_ip(req: &HttpRequest) -> Result<IpAddr, RequestError> {
    // First hop of X-Forwarded-For when behind a proxy.
    if let Some(forwarded_for) = req.headers().get("X-Forwarded-For") {
        if let Ok(value) = forwarded_for.to_str() {
            if let Some(first) = value.split(',').next() {
                if let Ok(ip) = first.trim().parse::<IpAddr>() {
                    debug!("Using X-Forwarded-For client IP {}", ip);
                    return Ok(ip);
                }
            }
        }
    }

    req.peer_addr()
        .map(|addr| addr.ip())
        .ok_or(RequestError::MissingPeerIP)
}

pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the admin session behind the request's bearer token.
pub fn require_admin(req: &HttpRequest, sessions: &SessionStore) -> Result<AdminSession, RequestError> {
    let token = bearer_token(req).ok_or(AuthError::MissingToken)?;
    Ok(sessions.verify(token)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn forwarded_for_wins_over_peer() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.9, 10.0.0.1"))
            .peer_addr("127.0.0.1:5000".parse().unwrap())
            .to_http_request();
        assert_eq!(extract_client_ip(&req).unwrap(), "203.0.113.9".parse::<IpAddr>().unwrap());

        let req = TestRequest::default()
            .peer_addr("127.0.0.1:5000".parse().unwrap())
            .to_http_request();
        assert_eq!(extract_client_ip(&req).unwrap(), "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn bearer_token_parsing() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc123"))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("abc123"));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic abc123"))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);
    }

    #[test]
    fn error_statuses() {
        use actix_web::http::StatusCode;
        let unsupported: RequestError = TicketError::Unsupported.into();
        assert_eq!(unsupported.error_response().status(), StatusCode::METHOD_NOT_ALLOWED);
        let missing: RequestError = TicketError::Missing("Email").into();
        assert_eq!(missing.error_response().status(), StatusCode::BAD_REQUEST);
        let down: RequestError = BackendError::Transport("refused".into()).into();
        assert_eq!(down.error_response().status(), StatusCode::BAD_GATEWAY);
    }
}
