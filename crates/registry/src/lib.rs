//! In-memory session registry.
//!
//! A session lives in the registry only while it has at least one member.
//! All reads and writes go through [`RegistryGuard`], so one coordinator step
//! sees and mutates a consistent view of every session.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};

use shared::{
    domain::{
        ConnectionId, LanguageMode, ParticipantName, SessionKey, TranscriptEntry,
        DEFAULT_DOCUMENT,
    },
    protocol::ServerEvent,
};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::info;

/// Outbound queue of a single connection.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug)]
pub struct Session {
    key: SessionKey,
    members: Vec<ParticipantName>,
    document: String,
    language: LanguageMode,
    last_output: String,
    transcript: Vec<TranscriptEntry>,
    subscribers: HashMap<ConnectionId, Outbox>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_key: SessionKey,
    pub members: Vec<ParticipantName>,
    pub language: LanguageMode,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            members: Vec::new(),
            document: DEFAULT_DOCUMENT.to_string(),
            language: LanguageMode::default(),
            last_output: String::new(),
            transcript: Vec::new(),
            subscribers: HashMap::new(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn members(&self) -> &[ParticipantName] {
        &self.members
    }

    pub fn has_member(&self, name: &ParticipantName) -> bool {
        self.members.contains(name)
    }

    /// Adds `name` unless a member with the same name is already present.
    pub fn add_member(&mut self, name: ParticipantName) -> bool {
        if self.has_member(&name) {
            return false;
        }
        self.members.push(name);
        true
    }

    pub fn remove_member(&mut self, name: &ParticipantName) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != name);
        self.members.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn set_document(&mut self, document: String) {
        self.document = document;
    }

    pub fn language(&self) -> LanguageMode {
        self.language
    }

    pub fn set_language(&mut self, language: LanguageMode) {
        self.language = language;
    }

    pub fn last_output(&self) -> &str {
        &self.last_output
    }

    pub fn set_last_output(&mut self, output: String) {
        self.last_output = output;
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn append(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry);
    }

    pub fn snapshot(&self) -> ServerEvent {
        ServerEvent::InitialState {
            document: self.document.clone(),
            language: self.language,
            output: self.last_output.clone(),
            transcript: self.transcript.clone(),
            members: self.members.clone(),
        }
    }

    pub fn membership_update(&self, joined: Option<ParticipantName>) -> ServerEvent {
        ServerEvent::UserJoined {
            joined,
            members: self.members.clone(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_key: self.key.clone(),
            members: self.members.clone(),
            language: self.language,
        }
    }

    pub fn subscribe(&mut self, connection_id: ConnectionId, outbox: Outbox) {
        self.subscribers.insert(connection_id, outbox);
    }

    pub fn unsubscribe(&mut self, connection_id: ConnectionId) -> bool {
        self.subscribers.remove(&connection_id).is_some()
    }

    pub fn is_subscribed(&self, connection_id: ConnectionId) -> bool {
        self.subscribers.contains_key(&connection_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Sends to one subscriber. Closed outboxes are ignored.
    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Some(outbox) = self.subscribers.get(&connection_id) {
            let _ = outbox.send(event);
        }
    }

    pub fn broadcast(&self, event: &ServerEvent) {
        for outbox in self.subscribers.values() {
            let _ = outbox.send(event.clone());
        }
    }

    pub fn broadcast_except(&self, sender: ConnectionId, event: &ServerEvent) {
        for (connection_id, outbox) in &self.subscribers {
            if *connection_id != sender {
                let _ = outbox.send(event.clone());
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionKey, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            sessions: self.sessions.lock().await,
        }
    }

    pub async fn contains(&self, key: &SessionKey) -> bool {
        self.lock().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lock().await.is_empty()
    }

    pub async fn summaries(&self) -> Vec<SessionSummary> {
        let guard = self.lock().await;
        let mut summaries: Vec<_> = guard.sessions.values().map(Session::summary).collect();
        summaries.sort_by(|a, b| a.session_key.cmp(&b.session_key));
        summaries
    }
}

pub struct RegistryGuard<'a> {
    sessions: MutexGuard<'a, HashMap<SessionKey, Session>>,
}

impl RegistryGuard<'_> {
    pub fn get_or_create(&mut self, key: &SessionKey) -> &mut Session {
        match self.sessions.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                info!(session_key = %key, "session created");
                entry.insert(Session::new(key.clone()))
            }
        }
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &SessionKey) -> Option<&mut Session> {
        self.sessions.get_mut(key)
    }

    pub fn remove(&mut self, key: &SessionKey) -> Option<Session> {
        let removed = self.sessions.remove(key);
        if removed.is_some() {
            info!(session_key = %key, "session destroyed");
        }
        removed
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
