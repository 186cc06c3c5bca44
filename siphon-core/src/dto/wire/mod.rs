//! Hub/agent wire protocol
//!
//! JSON text messages over a persistent bidirectional channel. Each message
//! carries its kind in the `type` field. Every message after the handshake is
//! bound to a `request_id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::article::ArticleRecord;
use crate::domain::locate::LocateInfo;
use crate::domain::source::SourceMeta;

/// Outcome of an agent registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterStatus {
    Ok,
    Rejected,
}

/// A message on the hub/agent channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
    /// Agent -> Hub: first message after connecting
    Register {
        name: String,
        #[serde(rename = "connectorIds")]
        connector_ids: Vec<String>,
    },

    /// Hub -> Agent: registration verdict
    RegisterAck {
        status: RegisterStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },

    /// Hub -> Agent: create a connector instance
    Start {
        request_id: String,
        #[serde(rename = "connectorId")]
        connector_id: String,
        #[serde(default)]
        params: Value,
    },

    /// Agent -> Hub: instance created, here is its source
    SourceInfo {
        request_id: String,
        #[serde(flatten)]
        meta: SourceMeta,
    },

    /// Hub -> Agent: run one fetch pass from these flags
    Continue {
        request_id: String,
        flags: LocateInfo,
    },

    /// Agent -> Hub: records produced by the fetch pass
    Articles {
        request_id: String,
        articles: Vec<ArticleRecord>,
    },

    /// Either direction: nothing (more) for this request
    Over { request_id: String },
}

impl WireMessage {
    /// Correlation id of the message, if it has one
    pub fn request_id(&self) -> Option<&str> {
        match self {
            WireMessage::Register { .. } | WireMessage::RegisterAck { .. } => None,
            WireMessage::Start { request_id, .. }
            | WireMessage::SourceInfo { request_id, .. }
            | WireMessage::Continue { request_id, .. }
            | WireMessage::Articles { request_id, .. }
            | WireMessage::Over { request_id } => Some(request_id),
        }
    }

    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Register { .. } => "register",
            WireMessage::RegisterAck { .. } => "registerAck",
            WireMessage::Start { .. } => "start",
            WireMessage::SourceInfo { .. } => "sourceInfo",
            WireMessage::Continue { .. } => "continue",
            WireMessage::Articles { .. } => "articles",
            WireMessage::Over { .. } => "over",
        }
    }

    pub fn over(request_id: impl Into<String>) -> Self {
        WireMessage::Over {
            request_id: request_id.into(),
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
