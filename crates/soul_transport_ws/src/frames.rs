use serde::{Deserialize, Serialize};
use serde_json::Value;
use soul_transport::TransportError;

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Connect {
        token: String,
        organization: String,
        blueprint: String,
        soul_id: String,
    },
    Dispatch {
        action: String,
        name: String,
        content: String,
    },
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    Ready,
    Error {
        message: String,
    },
    Says {
        id: String,
        streaming: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Chunk {
        id: String,
        text: String,
    },
    End {
        id: String,
    },
    Content {
        id: String,
        text: String,
    },
}

const SERVER_FRAME_TYPES: [&str; 6] = ["ready", "error", "says", "chunk", "end", "content"];

pub fn encode_client_frame(frame: &ClientFrame) -> Result<String, TransportError> {
    serde_json::to_string(frame)
        .map_err(|error| TransportError::Protocol(format!("failed to encode frame: {error}")))
}

/// Decodes a server text frame. Frames of unknown type decode to `None`.
pub fn decode_server_frame(text: &str) -> Result<Option<ServerFrame>, TransportError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|error| TransportError::Protocol(format!("invalid JSON frame: {error}")))?;
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(TransportError::Protocol("frame is missing 'type'".to_string()));
    };
    if !SERVER_FRAME_TYPES.contains(&kind) {
        return Ok(None);
    }

    let kind = kind.to_string();
    serde_json::from_value(value)
        .map(Some)
        .map_err(|error| TransportError::Protocol(format!("malformed '{kind}' frame: {error}")))
}
