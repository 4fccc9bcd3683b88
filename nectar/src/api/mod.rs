//! Nectar remote API surface: HTTP client and WebSocket farm session.

pub mod client;
pub mod ws;

pub use client::ApiClient;
pub use ws::{FarmSession, SessionEnd, SessionState};

use serde::{Deserialize, Serialize};

/// Standard response envelope used by every HTTP endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct NonceData {
    pub nonce: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ReferralStatus {
    /// Code this account was invited with, if any.
    pub invite_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserInfoData {
    #[serde(default)]
    pub referral: Option<ReferralStatus>,
    #[serde(default)]
    pub points: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct InviteCode {
    pub code: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Signed sign-in payload; the same shape is cached verbatim as the
/// WebSocket handshake message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedAuth {
    pub user_id: String,
    pub message: String,
    pub signature: String,
}

/// Client-to-server WebSocket messages.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsRequest {
    Auth { data: SignedAuth },
    Heartbeat { token: String, address: String },
}

/// Server-to-client WebSocket messages.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    AuthAck { data: AuthAckData },
    Points { data: PointsData },
    HeartbeatAck,
    Error { message: Option<String> },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct AuthAckData {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PointsData {
    #[serde(default)]
    pub today: f64,
    #[serde(default)]
    pub total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_with_and_without_data() {
        let raw = r#"{"success":true,"data":{"nonce":"abc123"}}"#;
        let parsed: ApiEnvelope<NonceData> = serde_json::from_str(raw).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.data.unwrap().nonce, "abc123");

        let raw = r#"{"success":false,"msg":"bad signature"}"#;
        let parsed: ApiEnvelope<LoginData> = serde_json::from_str(raw).unwrap();
        assert!(!parsed.success);
        assert!(parsed.data.is_none());
        assert_eq!(parsed.msg.as_deref(), Some("bad signature"));
    }

    #[test]
    fn ws_event_parses_known_and_unknown_types() {
        let raw = r#"{"type":"auth_ack","data":{"token":"sess-1"}}"#;
        match serde_json::from_str::<WsEvent>(raw).unwrap() {
            WsEvent::AuthAck { data } => assert_eq!(data.token, "sess-1"),
            other => panic!("unexpected event {:?}", other),
        }

        let raw = r#"{"type":"points","data":{"today":1.5,"total":99.25}}"#;
        match serde_json::from_str::<WsEvent>(raw).unwrap() {
            WsEvent::Points { data } => {
                assert_eq!(data.today, 1.5);
                assert_eq!(data.total, 99.25);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let raw = r#"{"type":"something_new"}"#;
        assert!(matches!(
            serde_json::from_str::<WsEvent>(raw).unwrap(),
            WsEvent::Unknown
        ));
    }

    #[test]
    fn ws_request_serializes_with_type_tag() {
        let msg = WsRequest::Heartbeat {
            token: "sess-1".to_string(),
            address: "0xabc".to_string(),
        };
        let raw = serde_json::to_string(&msg).unwrap();
        assert!(raw.contains(r#""type":"heartbeat""#));
        assert!(raw.contains(r#""token":"sess-1""#));
    }
}
