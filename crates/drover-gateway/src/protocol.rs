// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway wire envelope, opcodes and outbound payload builders.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Gateway opcodes.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Close codes at or above this value are session-fatal.
pub const SESSION_CLOSE_THRESHOLD: u16 = 4000;

/// Close code sent on graceful shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent when dropping a connection we intend to resume.
pub const CLOSE_RESUMABLE: u16 = 4000;

/// The gateway envelope. `d` is kept opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

/// Fields of READY the session keeps.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
}

pub fn build_identify(token: &str, compress: bool) -> GatewayPayload {
    GatewayPayload {
        op: opcode::IDENTIFY,
        d: Some(json!({
            "token": token,
            "capabilities": 16381,
            "compress": compress,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "drover",
                "device": "drover",
            },
            "presence": {
                "status": "online",
                "since": 0,
                "activities": [],
                "afk": false,
            },
        })),
        s: None,
        t: None,
    }
}

pub fn build_resume(token: &str, session_id: &str, seq: u64) -> GatewayPayload {
    GatewayPayload {
        op: opcode::RESUME,
        d: Some(json!({
            "token": token,
            "session_id": session_id,
            "seq": seq,
        })),
        s: None,
        t: None,
    }
}

pub fn build_heartbeat(seq: Option<u64>) -> GatewayPayload {
    GatewayPayload {
        op: opcode::HEARTBEAT,
        d: Some(seq.map_or(Value::Null, Value::from)),
        s: None,
        t: None,
    }
}

/// Append the protocol query to a gateway base URL.
pub fn connect_url(base: &str, api_version: u8) -> String {
    let base = base.trim_end_matches('/');
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}v={api_version}&encoding=json")
}

/// Resume URLs must be websocket URLs.
pub fn is_valid_resume_url(url: &str) -> bool {
    url.starts_with("wss://") || url.starts_with("ws://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_deserializes_with_sequence_and_type() {
        let payload: GatewayPayload =
            serde_json::from_str(r#"{"op":0,"s":42,"t":"MESSAGE_CREATE","d":{"id":"1"}}"#).unwrap();
        assert_eq!(payload.op, opcode::DISPATCH);
        assert_eq!(payload.s, Some(42));
        assert_eq!(payload.t.as_deref(), Some("MESSAGE_CREATE"));
    }

    #[test]
    fn ack_without_data_deserializes() {
        let payload: GatewayPayload = serde_json::from_str(r#"{"op":11}"#).unwrap();
        assert_eq!(payload.op, opcode::HEARTBEAT_ACK);
        assert!(payload.d.is_none());
    }

    #[test]
    fn resume_carries_session_and_sequence() {
        let resume = build_resume("tok", "sess-1", 7);
        let d = resume.d.unwrap();
        assert_eq!(resume.op, opcode::RESUME);
        assert_eq!(d["session_id"], "sess-1");
        assert_eq!(d["seq"], 7);
    }

    #[test]
    fn heartbeat_sends_null_before_first_dispatch() {
        assert_eq!(build_heartbeat(None).d, Some(Value::Null));
        assert_eq!(build_heartbeat(Some(3)).d, Some(Value::from(3)));
        let text = serde_json::to_string(&build_heartbeat(None)).unwrap();
        assert_eq!(text, r#"{"op":1,"d":null}"#);
    }

    #[test]
    fn connect_url_appends_query() {
        assert_eq!(
            connect_url("wss://gateway.test/", 9),
            "wss://gateway.test?v=9&encoding=json"
        );
        assert_eq!(
            connect_url("wss://gateway.test/?x=1", 10),
            "wss://gateway.test/?x=1&v=10&encoding=json"
        );
    }
}
