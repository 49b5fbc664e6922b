//! Applies participant actions to session state and fans out the results.
//!
//! Every action takes the registry guard for the duration of one synchronous
//! step, so actions on a session are applied one at a time in arrival order.
//! Execution requests release the guard while the external call is pending.

use std::sync::Arc;

use execution::{CodeExecutor, ExecutionRequest};
use registry::{Outbox, RegistryGuard, Session, SessionRegistry};
use shared::{
    domain::{ConnectionId, LanguageMode, ParticipantName, SessionKey, TranscriptEntry},
    protocol::{ClientRequest, ExecutionResult, ServerEvent},
};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub session_key: SessionKey,
    pub participant_name: ParticipantName,
}

/// Per-connection state owned by the transport handler.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    outbox: Outbox,
    association: Option<Association>,
}

impl Connection {
    pub fn new(id: ConnectionId, outbox: Outbox) -> Self {
        Self {
            id,
            outbox,
            association: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn association(&self) -> Option<&Association> {
        self.association.as_ref()
    }

    fn associated_name(&self, key: &SessionKey) -> Option<&ParticipantName> {
        match &self.association {
            Some(association) if &association.session_key == key => {
                Some(&association.participant_name)
            }
            _ => None,
        }
    }
}

/// Result of dispatching one client request.
pub enum Dispatch {
    Done,
    /// An execution was accepted; the caller decides where to await it.
    Execute(PendingExecution),
}

pub struct PendingExecution {
    coordinator: Coordinator,
    session_key: SessionKey,
    request: ExecutionRequest,
}

impl PendingExecution {
    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    pub async fn run(self) -> Option<ExecutionResult> {
        self.coordinator
            .complete_execution(&self.session_key, self.request)
            .await
    }
}

#[derive(Clone)]
pub struct Coordinator {
    registry: SessionRegistry,
    executor: Arc<dyn CodeExecutor>,
}

impl Coordinator {
    pub fn new(registry: SessionRegistry, executor: Arc<dyn CodeExecutor>) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, conn: &mut Connection, request: ClientRequest) -> Dispatch {
        match request {
            ClientRequest::Join {
                session_key,
                participant_name,
            } => self.join(conn, session_key, participant_name).await,
            ClientRequest::LeaveRoom => self.leave(conn).await,
            ClientRequest::CodeChange {
                session_key,
                document,
            } => self.edit_document(conn, &session_key, document).await,
            ClientRequest::LanguageChange {
                session_key,
                language,
            } => self.change_language(conn, &session_key, language).await,
            ClientRequest::Typing { session_key, .. } => {
                self.notify_typing(conn, &session_key).await
            }
            ClientRequest::SendMessage {
                session_key, text, ..
            } => self.send_chat_message(conn, &session_key, text).await,
            ClientRequest::CompileCode {
                session_key,
                code,
                language,
                version_hint,
            } => {
                let request = ExecutionRequest {
                    code,
                    language,
                    version_hint,
                };
                return match self.request_execution(conn, &session_key, request).await {
                    Some(pending) => Dispatch::Execute(pending),
                    None => Dispatch::Done,
                };
            }
        }
        Dispatch::Done
    }

    pub async fn join(&self, conn: &mut Connection, key: SessionKey, name: ParticipantName) {
        if key.is_blank() || name.is_blank() {
            debug!(connection_id = %conn.id, "join: blank session key or name ignored");
            return;
        }

        let mut guard = self.registry.lock().await;
        if let Some(previous) = conn.association.take() {
            leave_locked(&mut guard, conn.id, previous);
        }

        let session = guard.get_or_create(&key);
        let entry = TranscriptEntry::joined(&name);
        session.append(entry.clone());
        session.add_member(name.clone());

        session.broadcast_except(conn.id, &ServerEvent::ReceiveMessage { message: entry });
        session.broadcast_except(conn.id, &session.membership_update(Some(name.clone())));
        session.subscribe(conn.id, conn.outbox.clone());
        session.send_to(conn.id, session.snapshot());

        info!(
            session_key = %key,
            connection_id = %conn.id,
            participant = %name,
            members = session.members().len(),
            "participant joined"
        );
        conn.association = Some(Association {
            session_key: key,
            participant_name: name,
        });
    }

    pub async fn leave(&self, conn: &mut Connection) {
        let Some(association) = conn.association.take() else {
            return;
        };
        let mut guard = self.registry.lock().await;
        leave_locked(&mut guard, conn.id, association);
    }

    pub async fn edit_document(&self, conn: &Connection, key: &SessionKey, document: String) {
        self.with_member_session(conn, key, "codeChange", |session, _| {
            session.set_document(document);
            let event = ServerEvent::CodeUpdate {
                document: session.document().to_string(),
            };
            session.broadcast_except(conn.id, &event);
        })
        .await;
    }

    pub async fn change_language(&self, conn: &Connection, key: &SessionKey, language: LanguageMode) {
        self.with_member_session(conn, key, "languageChange", |session, _| {
            session.set_language(language);
            session.broadcast(&ServerEvent::LanguageUpdate { language });
        })
        .await;
    }

    pub async fn notify_typing(&self, conn: &Connection, key: &SessionKey) {
        self.with_member_session(conn, key, "typing", |session, name| {
            let event = ServerEvent::UserTyping {
                participant_name: name.clone(),
            };
            session.broadcast_except(conn.id, &event);
        })
        .await;
    }

    pub async fn send_chat_message(&self, conn: &Connection, key: &SessionKey, text: String) {
        if text.trim().is_empty() {
            debug!(connection_id = %conn.id, "sendMessage: empty text ignored");
            return;
        }
        self.with_member_session(conn, key, "sendMessage", |session, name| {
            let entry = TranscriptEntry::chat(name, text);
            session.append(entry.clone());
            session.broadcast(&ServerEvent::ReceiveMessage { message: entry });
        })
        .await;
    }

    /// Validates an execution request against the connection's session.
    ///
    /// The returned [`PendingExecution`] performs the external call without
    /// holding the registry guard.
    pub async fn request_execution(
        &self,
        conn: &Connection,
        key: &SessionKey,
        request: ExecutionRequest,
    ) -> Option<PendingExecution> {
        let accepted = self
            .with_member_session(conn, key, "compileCode", |_, _| ())
            .await;
        accepted.map(|()| PendingExecution {
            coordinator: self.clone(),
            session_key: key.clone(),
            request,
        })
    }

    /// Runs the request and folds the result into the session, if it still exists.
    pub async fn complete_execution(
        &self,
        key: &SessionKey,
        request: ExecutionRequest,
    ) -> Option<ExecutionResult> {
        let result = self.executor.execute(request).await;

        let mut guard = self.registry.lock().await;
        let Some(session) = guard.get_mut(key) else {
            debug!(session_key = %key, "execution finished after session was destroyed");
            return None;
        };
        session.set_last_output(result.output().to_string());
        session.broadcast(&ServerEvent::CodeResponse(result.clone()));
        Some(result)
    }

    async fn with_member_session<T>(
        &self,
        conn: &Connection,
        key: &SessionKey,
        action: &'static str,
        apply: impl FnOnce(&mut Session, &ParticipantName) -> T,
    ) -> Option<T> {
        let Some(name) = conn.associated_name(key) else {
            debug!(
                connection_id = %conn.id,
                session_key = %key,
                action,
                "action for a session this connection has not joined; dropped"
            );
            return None;
        };
        let mut guard = self.registry.lock().await;
        let Some(session) = guard.get_mut(key) else {
            debug!(session_key = %key, action, "session no longer exists; dropped");
            return None;
        };
        if !session.is_subscribed(conn.id) {
            debug!(
                connection_id = %conn.id,
                session_key = %key,
                action,
                "connection is not part of this session instance; dropped"
            );
            return None;
        }
        Some(apply(session, name))
    }
}

fn leave_locked(guard: &mut RegistryGuard<'_>, connection_id: ConnectionId, association: Association) {
    let Association {
        session_key,
        participant_name,
    } = association;
    let Some(session) = guard.get_mut(&session_key) else {
        return;
    };
    // A session recreated under the same key never saw this connection.
    if !session.is_subscribed(connection_id) {
        return;
    }

    let entry = TranscriptEntry::left(&participant_name);
    session.append(entry.clone());
    session.remove_member(&participant_name);
    session.unsubscribe(connection_id);
    info!(
        session_key = %session_key,
        connection_id = %connection_id,
        participant = %participant_name,
        members = session.members().len(),
        "participant left"
    );

    if session.is_empty() {
        guard.remove(&session_key);
        return;
    }
    session.broadcast(&ServerEvent::ReceiveMessage { message: entry });
    session.broadcast(&session.membership_update(None));
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
