//! Websocket client for one participant of a code room.

use futures::{SinkExt, StreamExt};
use shared::{
    domain::{LanguageMode, ParticipantName, SessionKey},
    protocol::{ClientRequest, ServerEvent},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server_url must start with http://, https://, ws:// or wss://")]
    InvalidServerUrl,
    #[error("failed to connect websocket {url}: {source}")]
    Connect {
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("failed to encode request: {0}")]
    Encode(#[from] shared::error::ProtocolError),
    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Server(ServerEvent),
    Error(String),
    Disconnected,
}

pub fn websocket_url(server_url: &str) -> Result<String, ClientError> {
    let server_url = server_url.trim_end_matches('/');
    let base = if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if server_url.starts_with("ws://") || server_url.starts_with("wss://") {
        server_url.to_string()
    } else {
        return Err(ClientError::InvalidServerUrl);
    };
    if base.ends_with("/ws") {
        Ok(base)
    } else {
        Ok(format!("{base}/ws"))
    }
}

pub struct RoomClient {
    session_key: SessionKey,
    participant_name: ParticipantName,
    outgoing: mpsc::UnboundedSender<String>,
    events: broadcast::Sender<ClientEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl RoomClient {
    /// Connects to `server_url` and joins `session_key` as `participant_name`.
    pub async fn join(
        server_url: &str,
        session_key: SessionKey,
        participant_name: ParticipantName,
    ) -> Result<Self, ClientError> {
        let url = websocket_url(server_url)?;
        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|source| ClientError::Connect {
                url: url.clone(),
                source,
            })?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (events, _) = broadcast::channel(256);
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                if ws_writer.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        let reader_events = events.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match ServerEvent::decode(&text) {
                        Ok(event) => {
                            let _ = reader_events.send(ClientEvent::Server(event));
                        }
                        Err(err) => {
                            debug!(%err, "ignoring unparseable server frame");
                            let _ = reader_events.send(ClientEvent::Error(err.to_string()));
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, "websocket receive failed");
                        let _ = reader_events
                            .send(ClientEvent::Error(format!("websocket receive failed: {err}")));
                        break;
                    }
                }
            }
            let _ = reader_events.send(ClientEvent::Disconnected);
        });

        let client = Self {
            session_key,
            participant_name,
            outgoing,
            events,
            tasks: vec![writer, reader],
        };
        client.send(ClientRequest::Join {
            session_key: client.session_key.clone(),
            participant_name: client.participant_name.clone(),
        })?;
        Ok(client)
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    pub fn participant_name(&self) -> &ParticipantName {
        &self.participant_name
    }

    /// Receivers only see events sent after subscribing.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn edit(&self, document: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientRequest::CodeChange {
            session_key: self.session_key.clone(),
            document: document.into(),
        })
    }

    pub fn change_language(&self, language: LanguageMode) -> Result<(), ClientError> {
        self.send(ClientRequest::LanguageChange {
            session_key: self.session_key.clone(),
            language,
        })
    }

    pub fn typing(&self) -> Result<(), ClientError> {
        self.send(ClientRequest::Typing {
            session_key: self.session_key.clone(),
            participant_name: self.participant_name.clone(),
        })
    }

    pub fn send_message(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientRequest::SendMessage {
            session_key: self.session_key.clone(),
            text: text.into(),
            participant_name: self.participant_name.clone(),
        })
    }

    pub fn run(
        &self,
        code: impl Into<String>,
        language: impl Into<String>,
        version_hint: Option<String>,
    ) -> Result<(), ClientError> {
        self.send(ClientRequest::CompileCode {
            session_key: self.session_key.clone(),
            code: code.into(),
            language: language.into(),
            version_hint,
        })
    }

    /// Leaves the session and closes the socket once queued frames are written.
    pub async fn leave(mut self) -> Result<(), ClientError> {
        self.send(ClientRequest::LeaveRoom)?;
        let (outgoing, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.outgoing, outgoing));
        if let Some(writer) = self.tasks.first_mut() {
            let _ = writer.await;
        }
        Ok(())
    }

    fn send(&self, request: ClientRequest) -> Result<(), ClientError> {
        let text = request.encode()?;
        self.outgoing.send(text).map_err(|_| ClientError::Closed)
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
