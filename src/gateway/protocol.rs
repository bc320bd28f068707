//! Gateway wire format.
//!
//! Every frame is a JSON object `{op, d, s, t}`. Inbound frames are decoded in
//! two steps: [`GatewayFrame`] captures the envelope (so the sequence number
//! is available even when the payload is malformed), then
//! [`GatewayFrame::into_inbound`] maps the opcode and event name onto
//! [`InboundFrame`] / [`DispatchEvent`]. Anything not recognised lands in an
//! explicit `Unknown` variant.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::download::AttachmentDescriptor;

/// Opcodes for gateway frames.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Dispatch event names.
pub mod event_name {
    pub const READY: &str = "READY";
    pub const RESUMED: &str = "RESUMED";
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
}

/// Default capability bitmask: guilds, guild messages, message content.
pub const DEFAULT_INTENTS: u64 = 33281;

/// Raw gateway envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayFrame {
    /// Parses an envelope from text.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the text is not a frame object.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Heartbeat frame carrying the last captured sequence number.
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self {
            op: opcode::HEARTBEAT,
            d: last_sequence.map_or(Value::Null, Value::from),
            s: None,
            t: None,
        }
    }

    /// Identify frame for a new session.
    #[must_use]
    pub fn identify(token: &str, intents: u64) -> Self {
        Self {
            op: opcode::IDENTIFY,
            d: json!({
                "token": token,
                "intents": intents,
                "properties": IdentifyProperties::current(),
            }),
            s: None,
            t: None,
        }
    }

    /// Serializes the frame to its JSON text.
    #[must_use]
    pub fn to_text(&self) -> String {
        // A struct of a u8, a Value, and options cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decodes the payload according to the opcode and event name.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when a known frame carries a payload of
    /// the wrong shape.
    pub fn into_inbound(self) -> Result<InboundFrame, serde_json::Error> {
        let frame = match self.op {
            opcode::DISPATCH => InboundFrame::Dispatch(DispatchEvent::decode(
                self.t.as_deref().unwrap_or_default(),
                self.d,
            )?),
            opcode::HEARTBEAT => InboundFrame::Heartbeat,
            opcode::RECONNECT => InboundFrame::Reconnect,
            opcode::INVALID_SESSION => InboundFrame::InvalidSession {
                resumable: self.d.as_bool().unwrap_or(false),
            },
            opcode::HELLO => {
                let hello: HelloPayload = serde_json::from_value(self.d)?;
                InboundFrame::Hello {
                    heartbeat_interval: Duration::from_millis(hello.heartbeat_interval),
                }
            }
            opcode::HEARTBEAT_ACK => InboundFrame::HeartbeatAck,
            op => InboundFrame::Unknown { op },
        };
        Ok(frame)
    }
}

/// Client metadata sent with identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl IdentifyProperties {
    fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: env!("CARGO_PKG_NAME").to_string(),
            device: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HelloPayload {
    heartbeat_interval: u64,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Dispatch(DispatchEvent),
    /// Server asks for an immediate heartbeat.
    Heartbeat,
    Reconnect,
    InvalidSession {
        resumable: bool,
    },
    Hello {
        heartbeat_interval: Duration,
    },
    HeartbeatAck,
    Unknown {
        op: u8,
    },
}

/// A decoded dispatch event.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    Ready(ReadyPayload),
    Resumed,
    MessageCreate(MessagePayload),
    Unknown(String),
}

impl DispatchEvent {
    fn decode(name: &str, data: Value) -> Result<Self, serde_json::Error> {
        let event = match name {
            event_name::READY => Self::Ready(serde_json::from_value(data)?),
            event_name::RESUMED => Self::Resumed,
            event_name::MESSAGE_CREATE => Self::MessageCreate(serde_json::from_value(data)?),
            other => Self::Unknown(other.to_string()),
        };
        Ok(event)
    }
}

/// `READY` payload fields this client reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    pub user: UserPayload,
}

/// A user object, reduced to the fields this client reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub id: String,
    pub username: String,
}

/// `MESSAGE_CREATE` payload fields this client reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessagePayload {
    pub channel_id: String,
    pub author: UserPayload,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl MessagePayload {
    /// Channel id as a snowflake, if it parses.
    #[must_use]
    pub fn channel(&self) -> Option<u64> {
        self.channel_id.parse().ok()
    }

    /// Message creation time, or now when missing or unparseable.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map_or_else(Utc::now, |ts| ts.with_timezone(&Utc))
    }

    /// Converts every attachment into a download descriptor.
    #[must_use]
    pub fn descriptors(&self) -> Vec<AttachmentDescriptor> {
        let created_at = self.created_at();
        self.attachments
            .iter()
            .map(|a| AttachmentDescriptor {
                remote_url: a.url.clone(),
                filename: a.filename.clone(),
                declared_content_type: a.content_type.clone(),
                declared_size_bytes: a.size,
                author_name: self.author.username.clone(),
                event_timestamp: created_at,
            })
            .collect()
    }
}

/// One attachment object on a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttachmentPayload {
    pub url: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
}
