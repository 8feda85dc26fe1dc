// src/auth.rs
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use rand::RngCore;
use std::fmt::Write;
use std::sync::Arc;
use thiserror::Error;

use crate::backend::{BackendError, RemoteBackend};
use crate::models::admin::AdminSession;
use crate::storage::local::{self, LocalStorage};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Session is invalid or expired")]
    InvalidSession,
    #[error("Password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut token = String::with_capacity(64);
    for byte in bytes {
        let _ = write!(&mut token, "{:02x}", byte);
    }
    token
}

/// Verified, expiring admin sessions keyed by bearer token.
pub struct SessionStore {
    backend: Arc<dyn RemoteBackend>,
    storage: Arc<LocalStorage>,
    sessions: DashMap<String, AdminSession>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn RemoteBackend>, storage: Arc<LocalStorage>, ttl: std::time::Duration) -> Self {
        let ttl = Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(8));
        let store = Self {
            backend,
            storage,
            sessions: DashMap::new(),
            ttl,
        };
        store.restore();
        store
    }

    fn restore(&self) {
        if let Some(session) = self.storage.get::<AdminSession>(local::ADMIN_SESSION) {
            if session.is_expired(Utc::now()) {
                debug!("Dropping expired saved admin session for {}", session.email);
                let _ = self.storage.remove(local::ADMIN_SESSION);
            } else {
                info!("Restored admin session for {}", session.email);
                self.sessions.insert(session.token.clone(), session);
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AdminSession, AuthError> {
        let email = email.trim().to_lowercase();
        let account = match self.backend.find_admin(&email).await? {
            Some(account) => account,
            None => {
                warn!("Login attempt for unknown admin {}", email);
                return Err(AuthError::InvalidCredentials);
            }
        };
        if !verify_password(password, &account.password_hash) {
            warn!("Wrong password for admin {}", email);
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        let session = AdminSession {
            token: new_token(),
            admin_id: account.id,
            email: account.email,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.insert(session.token.clone(), session.clone());
        if let Err(e) = self.storage.set(local::ADMIN_SESSION, &session) {
            warn!("Could not persist admin session: {}", e);
        }
        info!("Admin {} logged in", session.email);
        Ok(session)
    }

    pub fn verify(&self, token: &str) -> Result<AdminSession, AuthError> {
        let session = self
            .sessions
            .get(token)
            .map(|r| r.value().clone())
            .ok_or(AuthError::InvalidSession)?;
        if session.is_expired(Utc::now()) {
            self.revoke(token);
            return Err(AuthError::InvalidSession);
        }
        Ok(session)
    }

    pub fn logout(&self, token: &str) -> Result<(), AuthError> {
        if self.sessions.contains_key(token) {
            self.revoke(token);
            Ok(())
        } else {
            Err(AuthError::InvalidSession)
        }
    }

    fn revoke(&self, token: &str) {
        if let Some((_, session)) = self.sessions.remove(token) {
            debug!("Revoked session for {}", session.email);
        }
        let saved = self.storage.get::<AdminSession>(local::ADMIN_SESSION);
        if saved.map(|s| s.token == token).unwrap_or(false) {
            let _ = self.storage.remove(local::ADMIN_SESSION);
        }
    }

    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(now));
        before - self.sessions.len()
    }
}
