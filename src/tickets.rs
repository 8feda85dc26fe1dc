// src/tickets.rs
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::backend::{BackendError, RemoteBackend, ReplyRow, TicketRow};
use crate::models::ticket::{NewTicket, Stored, SupportTicket, TicketDetail, TicketReply, TicketStatus};
use crate::storage::local::{self, LocalStorage, StorageError};

const DEFAULT_SUBJECT: &str = "Support request";
const LOCAL_PREFIX: &str = "local-";

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Ticket {0} not found")]
    NotFound(String),
    #[error("Deleting tickets is not supported")]
    Unsupported,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// An admin reply together with the status it left the ticket in. `ticket`
/// is `None` when the backend was unreachable and the status change is
/// waiting in local storage.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReplyOutcome {
    pub reply: TicketReply,
    pub status: TicketStatus,
    pub ticket: Option<SupportTicket>,
}

/// What one `sync_fallback` run pushed to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SyncReport {
    pub tickets: usize,
    pub replies: usize,
    pub statuses: usize,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StatusCounts {
    pub open: usize,
    pub in_progress: usize,
    pub resolved: usize,
    pub local_only: usize,
}

/// Support ticket intake and the admin actions on tickets.
///
/// Writes that the backend rejects land in local storage instead; the
/// caller learns which through [`Stored`].
pub struct TicketService {
    backend: Arc<dyn RemoteBackend>,
    storage: Arc<LocalStorage>,
}

fn is_local(id: &str) -> bool {
    id.starts_with(LOCAL_PREFIX)
}

fn remote_error(id: &str, e: BackendError) -> TicketError {
    match e {
        BackendError::NotFound(_) => TicketError::NotFound(id.to_string()),
        e => e.into(),
    }
}

impl TicketService {
    pub fn new(backend: Arc<dyn RemoteBackend>, storage: Arc<LocalStorage>) -> Self {
        Self { backend, storage }
    }

    fn validate(form: &NewTicket) -> Result<TicketRow, TicketError> {
        let email = form.user_email.trim();
        let message = form.message.trim();
        if email.is_empty() {
            return Err(TicketError::Missing("Email"));
        }
        if message.is_empty() {
            return Err(TicketError::Missing("Message"));
        }

        let subject = match form.subject.trim() {
            "" => DEFAULT_SUBJECT.to_string(),
            s => s.to_string(),
        };
        let user_name = match form.user_name.trim() {
            "" => email.split('@').next().unwrap_or(email).to_string(),
            n => n.to_string(),
        };

        Ok(TicketRow {
            subject,
            message: message.to_string(),
            user_name,
            user_email: email.to_string(),
            status: TicketStatus::Open,
        })
    }

    pub async fn submit(&self, form: NewTicket) -> Result<Stored<SupportTicket>, TicketError> {
        let row = Self::validate(&form)?;

        match self.backend.insert_ticket(&row).await {
            Ok(ticket) => {
                info!("Ticket {} submitted by {}", ticket.id, ticket.user_email);
                Ok(Stored::Remote(ticket))
            }
            Err(e) => {
                warn!("Remote ticket submission failed, keeping it locally: {}", e);
                let ticket = self.store_locally(row)?;
                Ok(Stored::Local(ticket))
            }
        }
    }

    fn store_locally(&self, row: TicketRow) -> Result<SupportTicket, TicketError> {
        let now = Utc::now();
        let ticket = SupportTicket {
            id: format!("{}{}", LOCAL_PREFIX, uuid::Uuid::new_v4()),
            subject: row.subject,
            message: row.message,
            user_name: row.user_name,
            user_email: row.user_email,
            status: TicketStatus::Open,
            created_at: now,
            updated_at: now,
        };
        let stored = ticket.clone();
        self.storage
            .update_list::<SupportTicket, _>(local::FALLBACK_TICKETS, move |list| list.push(stored))?;
        debug!("Ticket {} stored locally", ticket.id);
        Ok(ticket)
    }

    fn local_tickets(&self) -> Vec<SupportTicket> {
        self.storage
            .get::<Vec<SupportTicket>>(local::FALLBACK_TICKETS)
            .unwrap_or_default()
    }

    fn local_replies(&self, ticket_id: &str) -> Vec<TicketReply> {
        self.storage
            .get::<Vec<TicketReply>>(local::FALLBACK_REPLIES)
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.ticket_id == ticket_id)
            .collect()
    }

    fn pending_statuses(&self) -> HashMap<String, TicketStatus> {
        self.storage
            .get::<HashMap<String, TicketStatus>>(local::PENDING_STATUSES)
            .unwrap_or_default()
    }

    fn mark_pending(&self, id: &str, status: TicketStatus) -> Result<(), TicketError> {
        self.storage
            .update::<HashMap<String, TicketStatus>, _>(local::PENDING_STATUSES, |pending| {
                pending.insert(id.to_string(), status);
            })?;
        Ok(())
    }

    fn clear_pending(&self, id: &str) -> Result<(), TicketError> {
        if self.pending_statuses().contains_key(id) {
            self.storage
                .update::<HashMap<String, TicketStatus>, _>(local::PENDING_STATUSES, |pending| {
                    pending.remove(id);
                })?;
        }
        Ok(())
    }

    /// Status changes that have not reached the backend yet win over the
    /// remote copy.
    fn overlay_pending(&self, tickets: &mut [SupportTicket]) {
        let pending = self.pending_statuses();
        if pending.is_empty() {
            return;
        }
        for ticket in tickets.iter_mut() {
            if let Some(status) = pending.get(&ticket.id) {
                ticket.status = *status;
            }
        }
    }

    /// Remote tickets merged with the ones only stored on this machine,
    /// newest first.
    pub async fn list(&self, status: Option<TicketStatus>) -> Result<Vec<SupportTicket>, TicketError> {
        let mut tickets = self.backend.list_tickets().await?;
        self.overlay_pending(&mut tickets);
        tickets.extend(self.local_tickets());
        if let Some(status) = status {
            tickets.retain(|t| t.status == status);
        }
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    pub async fn get(&self, id: &str) -> Result<TicketDetail, TicketError> {
        if is_local(id) {
            let ticket = self
                .local_tickets()
                .into_iter()
                .find(|t| t.id == id)
                .ok_or_else(|| TicketError::NotFound(id.to_string()))?;
            return Ok(TicketDetail {
                ticket,
                replies: self.local_replies(id),
                local_only: true,
            });
        }

        let mut ticket = self
            .backend
            .get_ticket(id)
            .await?
            .ok_or_else(|| TicketError::NotFound(id.to_string()))?;
        self.overlay_pending(std::slice::from_mut(&mut ticket));
        let mut replies = self.backend.list_replies(id).await?;
        replies.extend(self.local_replies(id));
        replies.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(TicketDetail {
            ticket,
            replies,
            local_only: false,
        })
    }

    /// Any status may move to any other.
    pub async fn set_status(&self, id: &str, status: TicketStatus) -> Result<SupportTicket, TicketError> {
        if is_local(id) {
            return self.set_local_status(id, status);
        }
        match self.backend.update_ticket_status(id, status).await {
            Ok(ticket) => {
                info!("Ticket {} is now {}", id, status);
                self.clear_pending(id)?;
                Ok(ticket)
            }
            Err(e) => {
                error!("Failed to update ticket {}: {}", id, e);
                Err(remote_error(id, e))
            }
        }
    }

    fn set_local_status(&self, id: &str, status: TicketStatus) -> Result<SupportTicket, TicketError> {
        let mut updated = None;
        self.storage
            .update_list::<SupportTicket, _>(local::FALLBACK_TICKETS, |list| {
                if let Some(t) = list.iter_mut().find(|t| t.id == id) {
                    t.status = status;
                    t.updated_at = Utc::now();
                    updated = Some(t.clone());
                }
            })?;
        updated.ok_or_else(|| TicketError::NotFound(id.to_string()))
    }

    /// Appends an admin reply and moves the ticket to in-progress.
    ///
    /// The status change goes first, so a reply is never kept for a ticket
    /// that does not exist. When the backend cannot be reached both the reply
    /// and the status change are kept locally until `sync_fallback`.
    pub async fn reply(
        &self,
        id: &str,
        message: &str,
        author: Option<String>,
    ) -> Result<Stored<ReplyOutcome>, TicketError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(TicketError::Missing("Message"));
        }
        let row = ReplyRow {
            ticket_id: id.to_string(),
            message: message.to_string(),
            is_admin: true,
            author,
        };

        if is_local(id) {
            let ticket = self.set_local_status(id, TicketStatus::InProgress)?;
            let reply = self.store_reply_locally(row)?;
            return Ok(Stored::Local(ReplyOutcome {
                reply,
                status: ticket.status,
                ticket: Some(ticket),
            }));
        }

        let ticket = match self.backend.update_ticket_status(id, TicketStatus::InProgress).await {
            Ok(ticket) => ticket,
            Err(e) if e.is_unavailable() => {
                warn!("Backend unreachable, keeping reply to {} locally: {}", id, e);
                self.mark_pending(id, TicketStatus::InProgress)?;
                let reply = self.store_reply_locally(row)?;
                return Ok(Stored::Local(ReplyOutcome {
                    reply,
                    status: TicketStatus::InProgress,
                    ticket: None,
                }));
            }
            Err(e) => return Err(remote_error(id, e)),
        };
        self.clear_pending(id)?;

        match self.backend.insert_reply(&row).await {
            Ok(reply) => {
                info!("Reply {} added to ticket {}", reply.id, id);
                Ok(Stored::Remote(ReplyOutcome {
                    reply,
                    status: ticket.status,
                    ticket: Some(ticket),
                }))
            }
            Err(e) if e.is_unavailable() => {
                warn!("Remote reply to {} failed, keeping it locally: {}", id, e);
                let reply = self.store_reply_locally(row)?;
                Ok(Stored::Local(ReplyOutcome {
                    reply,
                    status: ticket.status,
                    ticket: Some(ticket),
                }))
            }
            Err(e) => Err(remote_error(id, e)),
        }
    }

    fn store_reply_locally(&self, row: ReplyRow) -> Result<TicketReply, TicketError> {
        let reply = TicketReply {
            id: format!("{}{}", LOCAL_PREFIX, uuid::Uuid::new_v4()),
            ticket_id: row.ticket_id,
            message: row.message,
            is_admin: row.is_admin,
            author: row.author,
            created_at: Utc::now(),
        };
        let stored = reply.clone();
        self.storage
            .update_list::<TicketReply, _>(local::FALLBACK_REPLIES, move |list| list.push(stored))?;
        Ok(reply)
    }

    /// Tickets are never deleted.
    pub async fn delete(&self, id: &str) -> Result<(), TicketError> {
        warn!("Refusing to delete ticket {}", id);
        Err(TicketError::Unsupported)
    }

    /// Pushes locally kept tickets, replies and pending status changes to
    /// the backend. Stops at the first one the backend cannot take.
    pub async fn sync_fallback(&self) -> Result<SyncReport, TicketError> {
        let mut report = SyncReport::default();

        let mut synced: HashMap<String, String> = HashMap::new();
        for ticket in self.local_tickets() {
            let row = TicketRow {
                subject: ticket.subject.clone(),
                message: ticket.message.clone(),
                user_name: ticket.user_name.clone(),
                user_email: ticket.user_email.clone(),
                status: ticket.status,
            };
            match self.backend.insert_ticket(&row).await {
                Ok(remote) => {
                    debug!("Synced local ticket {} as {}", ticket.id, remote.id);
                    synced.insert(ticket.id, remote.id);
                }
                Err(e) => {
                    warn!("Ticket sync stopped at {}: {}", ticket.id, e);
                    break;
                }
            }
        }
        if !synced.is_empty() {
            self.storage
                .update_list::<SupportTicket, _>(local::FALLBACK_TICKETS, |list| {
                    list.retain(|t| !synced.contains_key(&t.id))
                })?;
            self.storage
                .update_list::<TicketReply, _>(local::FALLBACK_REPLIES, |list| {
                    for reply in list.iter_mut() {
                        if let Some(remote_id) = synced.get(&reply.ticket_id) {
                            reply.ticket_id = remote_id.clone();
                        }
                    }
                })?;
            report.tickets = synced.len();
        }

        let mut done: Vec<String> = Vec::new();
        let replies = self
            .storage
            .get::<Vec<TicketReply>>(local::FALLBACK_REPLIES)
            .unwrap_or_default();
        for reply in replies.iter().filter(|r| !is_local(&r.ticket_id)) {
            let row = ReplyRow {
                ticket_id: reply.ticket_id.clone(),
                message: reply.message.clone(),
                is_admin: reply.is_admin,
                author: reply.author.clone(),
            };
            match self.backend.insert_reply(&row).await {
                Ok(remote) => {
                    debug!("Synced local reply {} as {}", reply.id, remote.id);
                    report.replies += 1;
                    done.push(reply.id.clone());
                }
                Err(BackendError::NotFound(_)) => {
                    warn!("Dropping local reply {}: ticket {} is gone", reply.id, reply.ticket_id);
                    done.push(reply.id.clone());
                }
                Err(e) => {
                    warn!("Reply sync stopped at {}: {}", reply.id, e);
                    break;
                }
            }
        }
        if !done.is_empty() {
            self.storage
                .update_list::<TicketReply, _>(local::FALLBACK_REPLIES, |list| {
                    list.retain(|r| !done.contains(&r.id))
                })?;
        }

        let mut applied: Vec<String> = Vec::new();
        for (id, status) in self.pending_statuses() {
            match self.backend.update_ticket_status(&id, status).await {
                Ok(_) => {
                    debug!("Synced pending status {} for ticket {}", status, id);
                    report.statuses += 1;
                    applied.push(id);
                }
                Err(BackendError::NotFound(_)) => {
                    warn!("Dropping pending status for missing ticket {}", id);
                    applied.push(id);
                }
                Err(e) => {
                    warn!("Status sync stopped at {}: {}", id, e);
                    break;
                }
            }
        }
        if !applied.is_empty() {
            self.storage
                .update::<HashMap<String, TicketStatus>, _>(local::PENDING_STATUSES, |pending| {
                    pending.retain(|id, _| !applied.contains(id))
                })?;
        }

        info!(
            "Synced {} tickets, {} replies, {} status changes",
            report.tickets, report.replies, report.statuses
        );
        Ok(report)
    }

    pub async fn counts(&self) -> Result<StatusCounts, TicketError> {
        let mut counts = StatusCounts::default();
        for ticket in self.list(None).await? {
            if is_local(&ticket.id) {
                counts.local_only += 1;
            }
            match ticket.status {
                TicketStatus::Open => counts.open += 1,
                TicketStatus::InProgress => counts.in_progress += 1,
                TicketStatus::Resolved => counts.resolved += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBackend;

    fn service() -> (TicketService, Arc<MemoryBackend>, Arc<LocalStorage>) {
        let backend = Arc::new(MemoryBackend::new());
        let storage = Arc::new(LocalStorage::in_memory());
        let service = TicketService::new(backend.clone(), Arc::clone(&storage));
        (service, backend, storage)
    }

    fn form(email: &str, message: &str) -> NewTicket {
        NewTicket {
            subject: "Can't connect".into(),
            message: message.into(),
            user_name: "Sam".into(),
            user_email: email.into(),
        }
    }

    #[tokio::test]
    async fn missing_fields_never_reach_backend() {
        let (service, backend, _) = service();
        for (email, message) in [("", "hello"), ("sam@kindred.gg", ""), ("   ", "  ")] {
            let err = service.submit(form(email, message)).await.unwrap_err();
            assert!(matches!(err, TicketError::Missing(_)));
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn remote_submission_is_reported_as_remote() {
        let (service, _, storage) = service();
        let stored = service.submit(form("sam@kindred.gg", "help")).await.unwrap();
        assert!(stored.is_remote());
        assert_eq!(stored.get().status, TicketStatus::Open);
        assert!(storage.get::<Vec<SupportTicket>>(local::FALLBACK_TICKETS).is_none());
    }

    #[tokio::test]
    async fn failed_submission_falls_back_to_local_open_ticket() {
        let (service, backend, storage) = service();
        backend.set_available(false);

        let stored = service.submit(form("sam@kindred.gg", "help")).await.unwrap();
        assert_eq!(stored.durability(), "local");
        let ticket = stored.into_inner();
        assert!(ticket.id.starts_with("local-"));
        assert_eq!(ticket.status, TicketStatus::Open);

        let kept = storage.get::<Vec<SupportTicket>>(local::FALLBACK_TICKETS).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].status, TicketStatus::Open);
        assert_eq!(kept[0].user_email, "sam@kindred.gg");
    }

    #[tokio::test]
    async fn defaults_fill_subject_and_name() {
        let (service, _, _) = service();
        let stored = service
            .submit(NewTicket {
                user_email: "sam@kindred.gg".into(),
                message: "hi".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(stored.get().subject, "Support request");
        assert_eq!(stored.get().user_name, "sam");
    }

    #[tokio::test]
    async fn reply_forces_in_progress_from_any_status() {
        let (service, _, _) = service();
        for prior in TicketStatus::ALL {
            let ticket = service
                .submit(form("sam@kindred.gg", "help"))
                .await
                .unwrap()
                .into_inner();
            service.set_status(&ticket.id, prior).await.unwrap();

            let stored = service.reply(&ticket.id, "On it", Some("admin".into())).await.unwrap();
            assert!(stored.is_remote());
            let outcome = stored.into_inner();
            assert_eq!(outcome.status, TicketStatus::InProgress);
            assert_eq!(outcome.ticket.unwrap().status, TicketStatus::InProgress);

            let detail = service.get(&ticket.id).await.unwrap();
            assert_eq!(detail.ticket.status, TicketStatus::InProgress);
            assert_eq!(detail.replies.len(), 1);
        }
    }

    #[tokio::test]
    async fn local_ticket_reply_stays_local() {
        let (service, backend, _) = service();
        backend.set_available(false);
        let ticket = service
            .submit(form("sam@kindred.gg", "help"))
            .await
            .unwrap()
            .into_inner();

        let stored = service.reply(&ticket.id, "Seen", None).await.unwrap();
        assert!(!stored.is_remote());
        assert_eq!(stored.get().ticket.as_ref().unwrap().status, TicketStatus::InProgress);

        let detail = service.get(&ticket.id).await.unwrap();
        assert!(detail.local_only);
        assert_eq!(detail.replies[0].message, "Seen");
    }

    #[tokio::test]
    async fn reply_during_outage_keeps_reply_and_status_until_sync() {
        let (service, backend, storage) = service();
        let ticket = service
            .submit(form("sam@kindred.gg", "help"))
            .await
            .unwrap()
            .into_inner();
        backend.set_available(false);

        let stored = service.reply(&ticket.id, "Looking into it", Some("admin".into())).await.unwrap();
        assert_eq!(stored.durability(), "local");
        let outcome = stored.into_inner();
        assert_eq!(outcome.status, TicketStatus::InProgress);
        assert!(outcome.ticket.is_none());
        assert_eq!(storage.get::<Vec<TicketReply>>(local::FALLBACK_REPLIES).unwrap().len(), 1);

        backend.set_available(true);
        let detail = service.get(&ticket.id).await.unwrap();
        assert_eq!(detail.ticket.status, TicketStatus::InProgress);
        assert_eq!(detail.replies.len(), 1);
        let listed = service.list(Some(TicketStatus::InProgress)).await.unwrap();
        assert_eq!(listed.len(), 1);

        let report = service.sync_fallback().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                tickets: 0,
                replies: 1,
                statuses: 1
            }
        );
        assert!(storage
            .get::<Vec<TicketReply>>(local::FALLBACK_REPLIES)
            .unwrap_or_default()
            .is_empty());
        assert!(storage
            .get::<HashMap<String, TicketStatus>>(local::PENDING_STATUSES)
            .unwrap_or_default()
            .is_empty());

        let remote = backend.get_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(remote.status, TicketStatus::InProgress);
        let detail = service.get(&ticket.id).await.unwrap();
        assert_eq!(detail.replies.len(), 1);
        assert!(!detail.replies[0].id.starts_with("local-"));
        assert_eq!(detail.replies[0].message, "Looking into it");
    }

    #[tokio::test]
    async fn reply_to_missing_ticket_keeps_nothing() {
        let (service, _, storage) = service();
        for id in ["no-such-ticket", "local-no-such-ticket"] {
            let err = service.reply(id, "hello?", None).await.unwrap_err();
            assert!(matches!(err, TicketError::NotFound(_)));
        }
        assert!(storage.get::<Vec<TicketReply>>(local::FALLBACK_REPLIES).is_none());
        assert!(storage
            .get::<HashMap<String, TicketStatus>>(local::PENDING_STATUSES)
            .is_none());
    }

    #[tokio::test]
    async fn explicit_status_replaces_pending_one() {
        let (service, backend, _) = service();
        let ticket = service
            .submit(form("sam@kindred.gg", "help"))
            .await
            .unwrap()
            .into_inner();
        backend.set_available(false);
        service.reply(&ticket.id, "Seen", None).await.unwrap();

        backend.set_available(true);
        service.set_status(&ticket.id, TicketStatus::Resolved).await.unwrap();
        let detail = service.get(&ticket.id).await.unwrap();
        assert_eq!(detail.ticket.status, TicketStatus::Resolved);
        assert_eq!(service.sync_fallback().await.unwrap().statuses, 0);
    }

    #[tokio::test]
    async fn status_transitions_are_unconstrained() {
        let (service, _, _) = service();
        let ticket = service
            .submit(form("sam@kindred.gg", "help"))
            .await
            .unwrap()
            .into_inner();
        let t = service.set_status(&ticket.id, TicketStatus::Resolved).await.unwrap();
        assert_eq!(t.status, TicketStatus::Resolved);
        let t = service.set_status(&ticket.id, TicketStatus::Open).await.unwrap();
        assert_eq!(t.status, TicketStatus::Open);
    }

    #[tokio::test]
    async fn delete_is_refused() {
        let (service, _, _) = service();
        assert!(matches!(service.delete("anything").await, Err(TicketError::Unsupported)));
    }

    #[tokio::test]
    async fn sync_moves_local_tickets_to_backend() {
        let (service, backend, storage) = service();
        backend.set_available(false);
        service.submit(form("a@kindred.gg", "one")).await.unwrap();
        service.submit(form("b@kindred.gg", "two")).await.unwrap();

        backend.set_available(true);
        assert_eq!(service.sync_fallback().await.unwrap().tickets, 2);
        assert!(storage
            .get::<Vec<SupportTicket>>(local::FALLBACK_TICKETS)
            .unwrap()
            .is_empty());

        let listed = service.list(None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|t| !t.id.starts_with("local-")));
    }

    #[tokio::test]
    async fn list_filters_and_counts() {
        let (service, _, _) = service();
        let a = service.submit(form("a@kindred.gg", "one")).await.unwrap().into_inner();
        service.submit(form("b@kindred.gg", "two")).await.unwrap();
        service.set_status(&a.id, TicketStatus::Resolved).await.unwrap();

        let resolved = service.list(Some(TicketStatus::Resolved)).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, a.id);

        let counts = service.counts().await.unwrap();
        assert_eq!(counts.open, 1);
        assert_eq!(counts.resolved, 1);
        assert_eq!(counts.in_progress, 0);
    }
}
