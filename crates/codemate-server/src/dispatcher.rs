//! Dispatcher: maps connection ids to their sessions and routes frames.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use codemate_ai::session::Outbox;
use codemate_ai::{Session, SessionDeps, SessionSettings};
use codemate_common::{Envelope, ProtocolError};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub type ConnectionId = u64;

struct Entry {
    session: Arc<Mutex<Session>>,
    outbox: Outbox,
}

/// Thread-safe connection registry shared by every connection task.
#[derive(Clone)]
pub struct Dispatcher {
    sessions: Arc<RwLock<HashMap<ConnectionId, Entry>>>,
    next_id: Arc<AtomicU64>,
    deps: SessionDeps,
    settings: Arc<SessionSettings>,
}

impl Dispatcher {
    pub fn new(deps: SessionDeps, settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            deps,
            settings: Arc::new(settings),
        }
    }

    /// Start a session for a new connection. Envelopes for the client are
    /// delivered through `outbox`.
    pub async fn open(&self, outbox: Outbox) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Session::open(
            self.deps.clone(),
            self.settings.as_ref().clone(),
            outbox.clone(),
        );
        info!(connection = id, session = %session.id(), "connection opened");
        self.sessions.write().await.insert(
            id,
            Entry {
                session: Arc::new(Mutex::new(session)),
                outbox,
            },
        );
        id
    }

    /// Decode one text frame and hand it to the connection's session.
    /// Returns false when the connection is unknown.
    pub async fn route(&self, id: ConnectionId, text: &str) -> bool {
        let Some((session, outbox)) = self.lookup(id).await else {
            warn!(connection = id, "frame for unknown connection");
            return false;
        };

        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                report(id, &outbox, &err);
                return true;
            }
        };
        let kind = envelope.message_type();
        debug!(connection = id, %kind, "frame received");
        if !kind.is_client_originated() {
            report(id, &outbox, &ProtocolError::UnexpectedType(kind.to_string()));
            return true;
        }

        if let Err(err) = session.lock().await.handle(envelope).await {
            report(id, &outbox, &err);
        }
        true
    }

    /// Report a frame that could not even be decoded as text.
    pub async fn reject(&self, id: ConnectionId, err: &ProtocolError) {
        if let Some((_, outbox)) = self.lookup(id).await {
            report(id, &outbox, err);
        }
    }

    /// Drop the connection's session, cancelling its pending tool calls.
    pub async fn close(&self, id: ConnectionId) -> bool {
        let Some(entry) = self.sessions.write().await.remove(&id) else {
            return false;
        };
        match Arc::try_unwrap(entry.session) {
            Ok(session) => session.into_inner().close().await,
            // A route still holds it; dropping the last handle aborts the worker.
            Err(_) => debug!(connection = id, "session still in use, dropped"),
        }
        info!(connection = id, "connection closed");
        true
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn lookup(&self, id: ConnectionId) -> Option<(Arc<Mutex<Session>>, Outbox)> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .map(|entry| (entry.session.clone(), entry.outbox.clone()))
    }
}

fn report(id: ConnectionId, outbox: &Outbox, err: &ProtocolError) {
    warn!(connection = id, code = err.code(), error = %err, "protocol error");
    let _ = outbox.send(Envelope::protocol_error(err));
}
