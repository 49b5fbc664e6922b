use serde::{Deserialize, Serialize};

use crate::{
    domain::{LanguageMode, ParticipantName, SessionKey, TranscriptEntry},
    error::ProtocolError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientRequest {
    Join {
        session_key: SessionKey,
        participant_name: ParticipantName,
    },
    CodeChange {
        session_key: SessionKey,
        document: String,
    },
    LanguageChange {
        session_key: SessionKey,
        language: LanguageMode,
    },
    Typing {
        session_key: SessionKey,
        participant_name: ParticipantName,
    },
    SendMessage {
        session_key: SessionKey,
        text: String,
        participant_name: ParticipantName,
    },
    CompileCode {
        session_key: SessionKey,
        code: String,
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version_hint: Option<String>,
    },
    LeaveRoom,
}

impl ClientRequest {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientRequest::Join { .. } => "join",
            ClientRequest::CodeChange { .. } => "codeChange",
            ClientRequest::LanguageChange { .. } => "languageChange",
            ClientRequest::Typing { .. } => "typing",
            ClientRequest::SendMessage { .. } => "sendMessage",
            ClientRequest::CompileCode { .. } => "compileCode",
            ClientRequest::LeaveRoom => "leaveRoom",
        }
    }
}

/// Output of one stage (compile or run) of an execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub run: StageOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<StageOutput>,
}

impl ExecutionResult {
    pub const FAILURE_PREFIX: &'static str = "Failed to execute code.\n";

    pub fn failure(detail: impl AsRef<str>) -> Self {
        Self {
            run: StageOutput {
                output: format!("{}{}", Self::FAILURE_PREFIX, detail.as_ref()),
                ..StageOutput::default()
            },
            ..Self::default()
        }
    }

    pub fn output(&self) -> &str {
        &self.run.output
    }

    pub fn is_failure(&self) -> bool {
        self.language.is_none() && self.run.output.starts_with(Self::FAILURE_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerEvent {
    InitialState {
        document: String,
        language: LanguageMode,
        output: String,
        transcript: Vec<TranscriptEntry>,
        members: Vec<ParticipantName>,
    },
    UserJoined {
        joined: Option<ParticipantName>,
        members: Vec<ParticipantName>,
    },
    CodeUpdate {
        document: String,
    },
    LanguageUpdate {
        language: LanguageMode,
    },
    UserTyping {
        participant_name: ParticipantName,
    },
    ReceiveMessage {
        message: TranscriptEntry,
    },
    CodeResponse(ExecutionResult),
}

impl ServerEvent {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
