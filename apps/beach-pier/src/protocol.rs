//! JSON messages exchanged with signaling clients.
//!
//! Every frame is a single object tagged by `type`. Session descriptions and
//! candidates are kept as the exact JSON text the client sent and written
//! back out unchanged.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::FrameError;
use crate::registry::EndpointId;

/// Text sent back to a caller whose offer target is not reachable.
pub const USER_OFFLINE: &str = "User is offline";

/// Opaque JSON payload, held as its original source text.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Payload(Box<RawValue>);

impl Payload {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        RawValue::from_string(json.to_string()).map(Self)
    }

    pub fn get(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Eq for Payload {}

/// Messages sent from a client to the pier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Bind an endpoint identifier to the sending connection
    Register { user_id: EndpointId },
    Offer {
        target_user_id: EndpointId,
        caller_id: EndpointId,
        sdp: Payload,
    },
    /// Routed back to `caller_id`, the party that sent the offer
    Answer {
        caller_id: EndpointId,
        target_user_id: EndpointId,
        sdp: Payload,
    },
    IceCandidate {
        target_user_id: EndpointId,
        sender_id: EndpointId,
        candidate: Payload,
    },
    EndCall {
        target_user_id: EndpointId,
        sender_id: EndpointId,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Register { .. } => "register",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice_candidate",
            ClientMessage::EndCall { .. } => "end_call",
        }
    }
}

/// Flat view of an inbound frame.
///
/// `RawValue` cannot survive serde's buffering of internally tagged enums, so
/// frames are read into this struct first and checked per `type` afterwards.
/// A `null` payload counts as missing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    user_id: Option<EndpointId>,
    target_user_id: Option<EndpointId>,
    caller_id: Option<EndpointId>,
    sender_id: Option<EndpointId>,
    sdp: Option<Payload>,
    candidate: Option<Payload>,
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Box::<RawValue>::deserialize(deserializer).map(Self)
    }
}

fn required<T>(field: Option<T>, name: &'static str) -> Result<T, FrameError> {
    field.ok_or(FrameError::MissingField(name))
}

impl TryFrom<Frame> for ClientMessage {
    type Error = FrameError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        let message = match frame.kind.as_str() {
            "register" => ClientMessage::Register {
                user_id: required(frame.user_id, "userId")?,
            },
            "offer" => ClientMessage::Offer {
                target_user_id: required(frame.target_user_id, "targetUserId")?,
                caller_id: required(frame.caller_id, "callerId")?,
                sdp: required(frame.sdp, "sdp")?,
            },
            "answer" => ClientMessage::Answer {
                caller_id: required(frame.caller_id, "callerId")?,
                target_user_id: required(frame.target_user_id, "targetUserId")?,
                sdp: required(frame.sdp, "sdp")?,
            },
            "ice_candidate" => ClientMessage::IceCandidate {
                target_user_id: required(frame.target_user_id, "targetUserId")?,
                sender_id: required(frame.sender_id, "senderId")?,
                candidate: required(frame.candidate, "candidate")?,
            },
            "end_call" => ClientMessage::EndCall {
                target_user_id: required(frame.target_user_id, "targetUserId")?,
                sender_id: required(frame.sender_id, "senderId")?,
            },
            _ => return Err(FrameError::UnknownType(frame.kind)),
        };
        Ok(message)
    }
}

/// Messages sent from the pier to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Offer { caller_id: EndpointId, sdp: Payload },
    #[serde(rename_all = "camelCase")]
    Answer {
        target_user_id: EndpointId,
        sdp: Payload,
    },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        sender_id: EndpointId,
        candidate: Payload,
    },
    #[serde(rename_all = "camelCase")]
    EndCall { sender_id: EndpointId },
    ErrorMessage { message: String },
}

impl ServerMessage {
    pub fn user_offline() -> Self {
        ServerMessage::ErrorMessage {
            message: USER_OFFLINE.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::IceCandidate { .. } => "ice_candidate",
            ServerMessage::EndCall { .. } => "end_call",
            ServerMessage::ErrorMessage { .. } => "error_message",
        }
    }
}

pub fn decode_text(text: &str) -> Result<ClientMessage, FrameError> {
    let frame: Frame = serde_json::from_str(text)?;
    ClientMessage::try_from(frame)
}

/// Binary frames are accepted when they carry the same UTF-8 JSON as a text frame.
pub fn decode_binary(bytes: &[u8]) -> Result<ClientMessage, FrameError> {
    let text = std::str::from_utf8(bytes)?;
    decode_text(text)
}
