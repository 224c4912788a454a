//! Wire protocol shared by the life server and its clients.
//!
//! Every frame is a single JSON object. Server frames carry a `type` tag
//! (`config`, `ok`, `error`, `update`); client frames carry an `action`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// The only action a client may currently request.
pub const ACTION_VIEWPORT: &str = "viewport";

/// Rectangle of the world observed by one connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub rows: u32,
    pub cols: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, rows: u32, cols: u32) -> Self {
        Self { x, y, rows, cols }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.rows) * u64::from(self.cols)
    }
}

/// World and display parameters announced once per connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigState {
    pub rows: u32,
    pub cols: u32,
    pub speed: f64,
    pub cell_color: String,
    pub bg_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Config(ConfigState),
    Ok {
        message: String,
        viewport: Viewport,
    },
    Error {
        message: String,
    },
    /// `visible` is row-major, one byte per cell (0 dead, 1 alive).
    Update {
        viewport: Viewport,
        visible: Vec<Vec<u8>>,
    },
}

impl ServerMessage {
    pub fn ok(message: impl Into<String>, viewport: Viewport) -> Self {
        Self::Ok {
            message: message.into(),
            viewport,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Ok { .. } => "ok",
            Self::Error { .. } => "error",
            Self::Update { .. } => "update",
        }
    }
}

/// Reasons an inbound frame could not be turned into a [`ClientRequest`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid json")]
    InvalidJson,
    #[error("missing action")]
    MissingAction,
    #[error("unsupported action")]
    UnsupportedAction(String),
}

/// A decoded client frame.
///
/// The viewport payload is kept as raw JSON; field coercion and bounds are
/// the server's job.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    Viewport(JsonValue),
}

impl ClientRequest {
    pub fn parse(text: &str) -> Result<Self, RequestError> {
        let value: JsonValue =
            serde_json::from_str(text).map_err(|_| RequestError::InvalidJson)?;
        let action = match value.get("action") {
            Some(JsonValue::String(action)) => action.as_str(),
            Some(JsonValue::Null) | None => return Err(RequestError::MissingAction),
            Some(other) => return Err(RequestError::UnsupportedAction(other.to_string())),
        };
        if action != ACTION_VIEWPORT {
            return Err(RequestError::UnsupportedAction(action.to_string()));
        }
        let payload = value
            .get("viewport")
            .cloned()
            .unwrap_or_else(|| JsonValue::Object(Default::default()));
        Ok(Self::Viewport(payload))
    }
}

/// Client-side helper for composing a viewport request frame.
pub fn viewport_request(x: i64, y: i64, rows: i64, cols: i64) -> JsonValue {
    serde_json::json!({
        "action": ACTION_VIEWPORT,
        "viewport": { "x": x, "y": y, "rows": rows, "cols": cols },
    })
}

pub fn encode_message(message: &ServerMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

pub fn decode_message(data: &str) -> serde_json::Result<ServerMessage> {
    serde_json::from_str(data)
}
