//! Defines the control-channel protocol spoken with the remote realtime agent.
//!
//! Every frame is one JSON object carrying a `type` tag. Outbound frames are
//! [`ClientEvent`]s. Inbound frames decode into [`ServerEvent`]s; the agent's
//! vocabulary is much larger than what this device acts on, so every kind not
//! listed here is kept as [`ServerEvent::Other`] instead of failing the parse.

use crate::registry::ToolDefinition;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Messages sent from this device to the remote agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// The session-configuration handshake. Must be the first outbound frame.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    /// Adds an item to the conversation; used to hand back tool results.
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
}

impl ClientEvent {
    /// Wraps a tool result for the call identified by `call_id`.
    ///
    /// `output` is the JSON text of the handler's result map; the agent expects
    /// a string here, not a nested object.
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }

    /// The wire `type` of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::ConversationItemCreate { .. } => "conversation.item.create",
        }
    }

    /// Serializes the event into a single text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Session parameters advertised to the agent in the handshake.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// The complete tool catalogue, in registry order.
    pub tools: Vec<ToolDefinition>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    FunctionCallOutput { call_id: String, output: String },
}

/// Messages received from the remote agent.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// `response.output_item.done`: an output item finished streaming.
    OutputItemDone(OutputItemDone),
    /// `response.function_call_arguments.done`: the agent finished assembling a
    /// tool call and is waiting for its result.
    FunctionCallArgumentsDone(FunctionCallArgumentsDone),
    /// `error`: the agent rejected something this device sent.
    Error(ErrorEvent),
    /// Any other kind, kept verbatim for observers.
    Other { kind: String, payload: Value },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OutputItemDone {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
    /// The finished item. Its shape depends on the item type, so it is kept
    /// as raw JSON.
    #[serde(default)]
    pub item: Value,
}

impl OutputItemDone {
    /// Transcript of the first content part, when the item is a spoken message.
    pub fn transcript(&self) -> Option<&str> {
        self.item
            .get("content")?
            .get(0)?
            .get("transcript")?
            .as_str()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionCallArgumentsDone {
    /// Correlation token; echoed unchanged in the result.
    pub call_id: String,
    /// Name of the requested tool.
    pub name: String,
    /// JSON text of the call arguments.
    pub arguments: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub output_index: Option<u32>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    #[serde(default)]
    pub event_id: Option<String>,
    pub error: ErrorDetail,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorDetail {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// A single inbound frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum FrameParseError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("malformed `{kind}` event: {reason}")]
    Malformed { kind: String, reason: serde_json::Error },
}

impl ServerEvent {
    /// Decodes one text frame.
    pub fn from_frame(frame: &str) -> Result<Self, FrameParseError> {
        let payload: Value = serde_json::from_str(frame)?;
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameParseError::MissingType)?
            .to_owned();

        match kind.as_str() {
            "response.output_item.done" => decode(&kind, payload).map(Self::OutputItemDone),
            "response.function_call_arguments.done" => {
                decode(&kind, payload).map(Self::FunctionCallArgumentsDone)
            }
            "error" => decode(&kind, payload).map(Self::Error),
            _ => Ok(Self::Other { kind, payload }),
        }
    }

    /// The wire `type` of this event.
    pub fn kind(&self) -> &str {
        match self {
            Self::OutputItemDone(_) => "response.output_item.done",
            Self::FunctionCallArgumentsDone(_) => "response.function_call_arguments.done",
            Self::Error(_) => "error",
            Self::Other { kind, .. } => kind,
        }
    }
}

fn decode<T: DeserializeOwned>(kind: &str, payload: Value) -> Result<T, FrameParseError> {
    serde_json::from_value(payload).map_err(|reason| FrameParseError::Malformed {
        kind: kind.to_owned(),
        reason,
    })
}
