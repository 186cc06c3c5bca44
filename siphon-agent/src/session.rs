//! Hub-driven connector sessions
//!
//! A session lives from `start` to its single `continue`:
//! - `start`: admit, resolve and create under the local tracker, reply
//!   `sourceInfo`, or `over` when any of that fails
//! - `continue`: one fetch pass within the connector's budget, reply
//!   `articles` (or `over` when nothing came back), then release the session
//! - `over`: release the session without fetching
//!
//! Sessions the hub never continues are released after the session TTL.

use siphon_core::dto::wire::WireMessage;
use siphon_core::domain::locate::LocateInfo;
use siphon_engine::{CrawlContext, OpenRun, open_run};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct Session {
    run: OpenRun,
    expires_at: Instant,
}

pub struct SessionHandler {
    ctx: Arc<CrawlContext>,
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionHandler {
    pub fn new(ctx: Arc<CrawlContext>, ttl: Duration) -> Self {
        Self {
            ctx,
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Connector ids this agent advertises
    pub fn connector_ids(&self) -> Vec<String> {
        self.ctx.registry.all_ids().into_iter().collect()
    }

    /// Number of open sessions
    pub fn open(&self) -> usize {
        self.lock().len()
    }

    /// Handles one hub message, returning the reply to send back
    pub async fn handle(&self, msg: WireMessage) -> Option<WireMessage> {
        match msg {
            WireMessage::Start {
                request_id,
                connector_id,
                params,
            } => Some(self.start(request_id, &connector_id, &params).await),
            WireMessage::Continue { request_id, flags } => {
                Some(self.continue_session(request_id, &flags).await)
            }
            WireMessage::Over { request_id } => {
                self.release(&request_id).await;
                None
            }
            other => {
                warn!(kind = other.kind(), "unexpected message from hub");
                None
            }
        }
    }

    async fn start(
        &self,
        request_id: String,
        connector_id: &str,
        params: &serde_json::Value,
    ) -> WireMessage {
        if self.lock().contains_key(&request_id) {
            warn!(request_id = %request_id, "start for a session that is already open");
            return WireMessage::over(request_id);
        }

        let run = match open_run(&self.ctx, self.ctx.registry.as_ref(), connector_id, params).await {
            Ok(run) => run,
            Err(e) => {
                info!(connector = connector_id, request_id = %request_id, error = %e, "start declined");
                return WireMessage::over(request_id);
            }
        };

        let meta = run.source_meta();
        debug!(connector = connector_id, request_id = %request_id, "session opened");
        self.lock().insert(
            request_id.clone(),
            Session {
                run,
                expires_at: Instant::now() + self.ttl,
            },
        );
        WireMessage::SourceInfo { request_id, meta }
    }

    async fn continue_session(&self, request_id: String, flags: &LocateInfo) -> WireMessage {
        let Some(session) = self.lock().remove(&request_id) else {
            warn!(request_id = %request_id, "continue for an unknown or expired session");
            return WireMessage::over(request_id);
        };

        let run = session.run;
        let result = run.collect(flags, flags.default_preference()).await;
        run.close().await;

        match result {
            Ok(articles) if !articles.is_empty() => {
                debug!(request_id = %request_id, count = articles.len(), "fetch pass finished");
                WireMessage::Articles {
                    request_id,
                    articles,
                }
            }
            Ok(_) => WireMessage::over(request_id),
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "fetch pass failed");
                WireMessage::over(request_id)
            }
        }
    }

    async fn release(&self, request_id: &str) {
        let session = self.lock().remove(request_id);
        match session {
            Some(session) => {
                session.run.close().await;
                debug!(request_id, "session released by hub");
            }
            None => debug!(request_id, "over for an unknown session"),
        }
    }

    /// Releases sessions whose TTL has passed
    pub async fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(String, Session)> = {
            let mut sessions = self.lock();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.expires_at <= now)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|s| (id, s)))
                .collect()
        };

        let count = expired.len();
        for (request_id, session) in expired {
            info!(request_id = %request_id, "session expired without continue");
            session.run.close().await;
        }
        count
    }

    /// Releases every session, used when the hub channel drops
    pub async fn close_all(&self) {
        let sessions: Vec<Session> = self.lock().drain().map(|(_, s)| s).collect();
        if !sessions.is_empty() {
            info!(count = sessions.len(), "releasing sessions of a closed channel");
        }
        for session in sessions {
            session.run.close().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
