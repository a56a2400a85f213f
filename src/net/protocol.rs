//! Wire-level message taxonomy
//!
//! Every message travels as an [`Envelope`] naming a logical channel, an event
//! and a JSON payload. Inbound envelopes decode into [`InboundMessage`];
//! outbound user intents encode from [`Intent`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::world::cursor::PresenceUpdate;
use crate::world::entity::{RecordError, ServerRecord};
use crate::world::lenient;

/// Logical channel a message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Entity snapshots and deltas
    Aquarium,
    /// Cursor presence and user intents
    Interactions,
    /// Join/leave notifications
    Users,
    Chat,
    Store,
    /// Input injected by the local host (pointer, clicks, tool use)
    Local,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Aquarium => "aquarium",
            Channel::Interactions => "interactions",
            Channel::Users => "users",
            Channel::Chat => "chat",
            Channel::Store => "store",
            Channel::Local => "local",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One framed message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: Channel,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(channel: Channel, event: impl Into<String>, data: Value) -> Self {
        Self {
            channel,
            event: event.into(),
            data,
        }
    }
}

/// Errors decoding an envelope into a known message
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown event {event:?} on channel {channel}")]
    UnknownEvent { channel: Channel, event: String },
    #[error("Malformed {event:?} payload: {reason}")]
    Malformed { event: String, reason: String },
    #[error("Bad entity record: {0}")]
    Record(#[from] RecordError),
}

/// A user-info refresh (`update_user`)
#[derive(Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub username: String,
    pub money: Option<f64>,
    /// The full payload, for fields the view layer shows verbatim
    pub fields: Map<String, Value>,
}

/// Host-originated input on the `local` channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAction {
    /// Pointer moved
    Cursor,
    Tap,
    Use,
    Pickup,
    Select,
    Feed,
    /// Primary click; hit-tested against collectibles
    Click,
}

impl LocalAction {
    fn from_event(event: &str) -> Option<Self> {
        match event {
            "cursor" | "pointer" | "mousemove" => Some(LocalAction::Cursor),
            "tap" => Some(LocalAction::Tap),
            "use" => Some(LocalAction::Use),
            "pickup" => Some(LocalAction::Pickup),
            "select" => Some(LocalAction::Select),
            "feed" => Some(LocalAction::Feed),
            "click" => Some(LocalAction::Click),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LocalPayload {
    #[serde(default, deserialize_with = "lenient::number")]
    x: Option<f32>,
    #[serde(default, deserialize_with = "lenient::number")]
    y: Option<f32>,
    #[serde(default, alias = "type", deserialize_with = "lenient::text")]
    tool: Option<String>,
}

/// Input the local host wants turned into an outbound intent
#[derive(Debug, Clone, PartialEq)]
pub struct LocalInput {
    pub action: LocalAction,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub tool: Option<String>,
}

/// A decoded inbound envelope
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// Complete snapshot; `rejected` counts records that could not be read
    FullSync { records: Vec<ServerRecord>, rejected: usize },
    /// One entity changed (or was removed)
    EntityUpdate(ServerRecord),
    Presence(PresenceUpdate),
    UserLeft(String),
    UserJoined(String),
    UserInfo(UserInfo),
    Chat(Value),
    StoreSummary(Value),
    Local(LocalInput),
}

impl InboundMessage {
    /// Decode an envelope by channel and event name
    pub fn decode(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope { channel, event, data } = envelope;
        match (channel, event.as_str()) {
            (Channel::Aquarium, "sync_everything") => decode_full_sync(data, &event),
            (Channel::Aquarium, "update_thing") => {
                Ok(InboundMessage::EntityUpdate(ServerRecord::from_value(data)?))
            }
            (
                Channel::Interactions,
                "cursor" | "update_cursor" | "my_cursor" | "tap" | "pickup" | "pick_up_item" | "use" | "select",
            ) => decode_presence(data, &event),
            (Channel::Interactions | Channel::Users, "user_disconnected") => {
                Ok(InboundMessage::UserLeft(username_of(&data, &event)?))
            }
            (Channel::Interactions | Channel::Users, "user_connected") => {
                Ok(InboundMessage::UserJoined(username_of(&data, &event)?))
            }
            (Channel::Interactions | Channel::Users, "update_user") => decode_user_info(data, &event),
            (Channel::Chat, "new_message") => Ok(InboundMessage::Chat(data)),
            (Channel::Store, "summarize_store") => Ok(InboundMessage::StoreSummary(data)),
            (Channel::Local, name) => match LocalAction::from_event(name) {
                Some(action) => {
                    let payload: LocalPayload = if data.is_null() {
                        LocalPayload::default()
                    } else {
                        serde_json::from_value(data).map_err(|e| malformed(&event, e))?
                    };
                    Ok(InboundMessage::Local(LocalInput {
                        action,
                        x: payload.x,
                        y: payload.y,
                        tool: payload.tool,
                    }))
                }
                None => Err(ProtocolError::UnknownEvent { channel, event: event.clone() }),
            },
            _ => Err(ProtocolError::UnknownEvent { channel, event: event.clone() }),
        }
    }
}

fn malformed(event: &str, reason: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::Malformed {
        event: event.to_string(),
        reason: reason.to_string(),
    }
}

fn decode_full_sync(data: Value, event: &str) -> Result<InboundMessage, ProtocolError> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("entities").or_else(|| map.remove("objects")) {
            Some(Value::Array(items)) => items,
            _ => return Err(malformed(event, "expected an entities array")),
        },
        _ => return Err(malformed(event, "expected an array or object")),
    };

    let mut records = Vec::with_capacity(items.len());
    let mut rejected = 0;
    for item in items {
        match ServerRecord::from_value(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Skipping unreadable record in full sync: {}", e);
                rejected += 1;
            }
        }
    }

    Ok(InboundMessage::FullSync { records, rejected })
}

fn decode_presence(data: Value, event: &str) -> Result<InboundMessage, ProtocolError> {
    let mut update: PresenceUpdate = serde_json::from_value(data).map_err(|e| malformed(event, e))?;
    // Named envelopes carry their action in the event; movement envelopes
    // carry it (if any) in the payload
    if !matches!(event, "cursor" | "update_cursor" | "my_cursor") {
        update.event = Some(event.to_string());
    }
    Ok(InboundMessage::Presence(update))
}

fn username_of(data: &Value, event: &str) -> Result<String, ProtocolError> {
    let name = match data {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("username").and_then(Value::as_str),
        _ => None,
    };
    match name {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(malformed(event, "missing username")),
    }
}

fn decode_user_info(data: Value, event: &str) -> Result<InboundMessage, ProtocolError> {
    let username = username_of(&data, event)?;
    let Value::Object(fields) = data else {
        return Err(malformed(event, "expected an object"));
    };
    let money = fields.get("money").and_then(|m| match m {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });
    Ok(InboundMessage::UserInfo(UserInfo { username, money, fields }))
}

/// A user-originated action sent to the server. Fire-and-forget.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Tap { x: f32, y: f32 },
    Use { x: f32, y: f32, tool: Option<String> },
    Pickup { item: String },
    Select { tool: String },
    CursorMove { x: f32, y: f32 },
    Feed { x: f32, y: f32 },
    /// Collect the entity with this id
    Click { label: String },
}

impl Intent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Intent::Tap { .. } => "tap",
            Intent::Use { .. } => "use",
            Intent::Pickup { .. } => "pickup",
            Intent::Select { .. } => "select",
            Intent::CursorMove { .. } => "cursor",
            Intent::Feed { .. } => "feed",
            Intent::Click { .. } => "click",
        }
    }

    pub fn channel(&self) -> Channel {
        Channel::Interactions
    }

    /// Envelope stamped with the sender and local send time
    pub fn into_envelope(self, username: &str, timestamp_ms: u64) -> Envelope {
        let event = self.event_name();
        let mut data = json!({ "username": username, "timestamp": timestamp_ms });
        let extra = match self {
            Intent::Tap { x, y } | Intent::Feed { x, y } => json!({ "x": x, "y": y }),
            Intent::CursorMove { x, y } => json!({ "x": x, "y": y, "event": "mousemove" }),
            Intent::Use { x, y, tool } => json!({ "x": x, "y": y, "tool": tool }),
            Intent::Pickup { item } => json!({ "type": item }),
            Intent::Select { tool } => json!({ "tool": tool }),
            Intent::Click { label } => json!({ "label": label }),
        };
        if let (Value::Object(base), Value::Object(extra)) = (&mut data, extra) {
            base.extend(extra);
        }
        Envelope::new(Channel::Interactions, event, data)
    }
}
