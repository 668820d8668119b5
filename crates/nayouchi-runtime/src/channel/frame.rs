//! Event-bus bridge framing
//!
//! JSON frames exchanged with a SockJS event-bus bridge over a raw WebSocket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame sent to the bridge
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum OutboundFrame<'a> {
    Send {
        address: &'a str,
        body: &'a Value,
        #[serde(rename = "replyAddress", skip_serializing_if = "Option::is_none")]
        reply_address: Option<&'a str>,
    },
    Register {
        address: &'a str,
    },
    Unregister {
        address: &'a str,
    },
    Ping,
}

impl OutboundFrame<'_> {
    pub(crate) fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Frame received from the bridge
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum InboundFrame {
    /// Message delivered to a reply address or a registered topic
    Rec {
        address: String,
        #[serde(default)]
        body: Value,
    },
    /// Failure, either of a request (address = its reply address) or of the bridge
    Err {
        #[serde(default)]
        address: Option<String>,
        #[serde(rename = "failureCode", default)]
        failure_code: Option<i64>,
        #[serde(rename = "failureType", default)]
        failure_type: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    Pong,
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    pub(crate) fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
