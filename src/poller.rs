// src/poller.rs
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::models::server::{RenderState, ServerInfo, StatusView};
use crate::notify::Notifier;
use crate::query::ServerQuery;

struct PollState {
    info: Option<ServerInfo>,
    loading: bool,
    applied_seq: u64,
    last_checked: Option<DateTime<Utc>>,
}

/// Keeps the status widget's view of the game server current.
///
/// Ticks never wait on each other. Every query is numbered when issued and
/// only a result newer than the last applied one may replace the state, so a
/// slow response cannot clobber a fresher one.
pub struct StatusPoller {
    query: Arc<dyn ServerQuery>,
    notifier: Arc<Notifier>,
    interval: Duration,
    state: RwLock<PollState>,
    issued: AtomicU64,
    active: AtomicBool,
}

impl StatusPoller {
    pub fn new(query: Arc<dyn ServerQuery>, notifier: Arc<Notifier>, interval: Duration) -> Self {
        Self {
            query,
            notifier,
            interval,
            state: RwLock::new(PollState {
                info: None,
                loading: true,
                applied_seq: 0,
                last_checked: None,
            }),
            issued: AtomicU64::new(0),
            active: AtomicBool::new(true),
        }
    }

    /// Runs one query and applies its outcome. Returns the applied state, or
    /// `None` when the result was stale or the poller has been stopped.
    pub async fn poll_once(&self) -> Option<ServerInfo> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Poll #{} issued", seq);

        match self.query.query().await {
            Ok(resp) => {
                debug!("Poll #{} answered by {} ({})", seq, resp.hostname, resp.language);
                let players = resp.players;
                let info = ServerInfo::from(resp);
                if self.apply(seq, info.clone()) {
                    self.notifier.success(format!("Server online: {} players", players));
                    Some(info)
                } else {
                    None
                }
            }
            Err(e) => {
                warn!("Poll #{} failed: {}", seq, e);
                let info = ServerInfo::offline();
                if self.apply(seq, info.clone()) {
                    self.notifier.error("Game server is offline");
                    Some(info)
                } else {
                    None
                }
            }
        }
    }

    fn apply(&self, seq: u64, info: ServerInfo) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            debug!("Poll #{} finished after stop, dropping result", seq);
            return false;
        }
        let mut state = self.state.write();
        if seq <= state.applied_seq {
            debug!("Poll #{} is older than applied #{}, dropping result", seq, state.applied_seq);
            return false;
        }
        state.applied_seq = seq;
        state.info = Some(info);
        state.loading = false;
        state.last_checked = Some(Utc::now());
        true
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<ServerInfo> {
        self.state.read().info.clone()
    }

    pub fn render_state(&self) -> RenderState {
        Self::render(&self.state.read())
    }

    fn render(state: &PollState) -> RenderState {
        match &state.info {
            Some(info) if info.is_online => RenderState::Online,
            None if state.loading => RenderState::Loading,
            _ => RenderState::Offline,
        }
    }

    pub fn view(&self) -> StatusView {
        let state = self.state.read();
        let render = Self::render(&state);
        let players_label = match (&state.info, render) {
            (Some(info), RenderState::Online) => match (info.players, info.maxplayers) {
                (Some(p), Some(m)) => Some(format!("{} / {}", p, m)),
                _ => None,
            },
            _ => None,
        };
        StatusView {
            state: render,
            indicator: render.indicator(),
            info: state.info.clone(),
            players_label,
            last_checked: state.last_checked,
        }
    }

    /// Starts ticking: one query immediately, then one per interval.
    pub fn spawn(self: &Arc<Self>) -> PollerHandle {
        self.active.store(true, Ordering::SeqCst);
        let poller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poller.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Status poller started, interval {:?}", poller.interval);
            loop {
                ticker.tick().await;
                let tick = Arc::clone(&poller);
                tokio::spawn(async move {
                    tick.poll_once().await;
                });
            }
        });
        PollerHandle {
            poller: Arc::clone(self),
            task,
        }
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Owning handle for the poll loop. Stopping it (or dropping it) ends the
/// loop and discards any query still in flight.
pub struct PollerHandle {
    poller: Arc<StatusPoller>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.poller.stop();
        self.task.abort();
        info!("Status poller stopped");
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.poller.stop();
        self.task.abort();
    }
}
