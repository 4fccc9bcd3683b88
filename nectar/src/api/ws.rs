use anyhow::Result;
use farm_core::{dial_through_proxy, AuthError, NetworkError, ProxyConfig};
use futures_util::{SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::client_async_tls;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{WsEvent, WsRequest};

const WS_HOST: &str = "ws.nectar.gg";
const WS_PORT: u16 = 443;
const WS_URL: &str = "wss://ws.nectar.gg/";

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const AUTH_ACK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Active,
}

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Cancelled,
    ServerClosed,
}

/// A single farming connection for one account. The session dials the
/// endpoint (through the worker's proxy when one is assigned), replays the
/// cached signed auth payload, then heartbeats until cancelled or dropped.
pub struct FarmSession {
    address: String,
    auth_payload: String,
    state: SessionState,
}

impl FarmSession {
    pub fn new(address: &str, auth_payload: &str) -> Self {
        Self {
            address: address.to_string(),
            auth_payload: auth_payload.to_string(),
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session to completion. Returns `Ok` when the session ended
    /// cleanly (cancelled or closed by the server) and `Err` on transport or
    /// authentication failure; the caller decides whether to retry.
    pub async fn run(
        &mut self,
        proxy: Option<&ProxyConfig>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd> {
        self.state = SessionState::Connecting;
        let tcp = dial_through_proxy(proxy, WS_HOST, WS_PORT).await?;
        let (ws, _response) = client_async_tls(WS_URL, tcp).await.map_err(|e| {
            NetworkError::WebSocket {
                reason: format!("handshake with {} failed: {}", WS_URL, e),
            }
        })?;
        let (mut sink, mut stream) = ws.split();

        // Replay the stored signed payload; the server answers with a
        // session token used for every subsequent heartbeat.
        self.state = SessionState::Authenticating;
        sink.send(Message::Text(self.auth_payload.clone())).await.map_err(|e| {
            NetworkError::WebSocket {
                reason: format!("failed to send auth payload: {}", e),
            }
        })?;

        let session_token = timeout(AUTH_ACK_TIMEOUT, Self::await_auth_ack(&self.address, &mut stream))
            .await
            .map_err(|_| NetworkError::Timeout {
                timeout_ms: AUTH_ACK_TIMEOUT.as_millis() as u64,
                endpoint: WS_URL.to_string(),
            })??;

        self.state = SessionState::Active;
        info!("WebSocket session authenticated for {}", self.address);

        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so the heartbeat cadence
        // starts one interval after auth.
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    self.state = SessionState::Disconnected;
                    return Ok(SessionEnd::Cancelled);
                }
                _ = heartbeat.tick() => {
                    let beat = WsRequest::Heartbeat {
                        token: session_token.clone(),
                        address: self.address.clone(),
                    };
                    let raw = serde_json::to_string(&beat)?;
                    debug!("Heartbeat -> {}", self.address);
                    sink.send(Message::Text(raw)).await.map_err(|e| {
                        NetworkError::WebSocket {
                            reason: format!("heartbeat send failed: {}", e),
                        }
                    })?;
                }
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Text(raw))) => {
                            if let Err(e) = self.handle_event(&raw) {
                                self.state = SessionState::Disconnected;
                                return Err(e);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            sink.send(Message::Pong(data)).await.ok();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(
                                "Server closed session for {}: {:?}",
                                self.address, frame
                            );
                            self.state = SessionState::Disconnected;
                            return Ok(SessionEnd::ServerClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            self.state = SessionState::Disconnected;
                            return Err(NetworkError::WebSocket {
                                reason: format!("stream error: {}", e),
                            }
                            .into());
                        }
                        None => {
                            self.state = SessionState::Disconnected;
                            return Err(NetworkError::WebSocket {
                                reason: "connection dropped".to_string(),
                            }
                            .into());
                        }
                    }
                }
            }
        }
    }

    async fn await_auth_ack<S>(address: &str, stream: &mut S) -> Result<String>
    where
        S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        while let Some(incoming) = stream.next().await {
            let message = incoming.map_err(|e| NetworkError::WebSocket {
                reason: format!("stream error during auth: {}", e),
            })?;
            let raw = match message {
                Message::Text(raw) => raw,
                Message::Close(frame) => {
                    return Err(AuthError::HandshakeRejected {
                        address: address.to_string(),
                        reason: format!("closed during auth: {:?}", frame),
                    }
                    .into())
                }
                _ => continue,
            };

            match serde_json::from_str::<WsEvent>(&raw) {
                Ok(WsEvent::AuthAck { data }) => return Ok(data.token),
                Ok(WsEvent::Error { message }) => {
                    return Err(AuthError::HandshakeRejected {
                        address: address.to_string(),
                        reason: message.unwrap_or_else(|| "unspecified".to_string()),
                    }
                    .into())
                }
                Ok(other) => debug!("Ignoring pre-auth event: {:?}", other),
                Err(e) => warn!("Unparseable pre-auth frame: {}", e),
            }
        }

        Err(NetworkError::WebSocket {
            reason: "connection dropped during auth".to_string(),
        }
        .into())
    }

    fn handle_event(&self, raw: &str) -> Result<()> {
        match serde_json::from_str::<WsEvent>(raw) {
            Ok(WsEvent::Points { data }) => {
                info!(
                    "{} earned {:.2} today ({:.2} total)",
                    self.address, data.today, data.total
                );
                Ok(())
            }
            Ok(WsEvent::HeartbeatAck) => {
                debug!("Heartbeat acknowledged for {}", self.address);
                Ok(())
            }
            Ok(WsEvent::Error { message }) => {
                let reason = message.unwrap_or_else(|| "unspecified".to_string());
                Err(classify_server_error(&self.address, reason))
            }
            Ok(WsEvent::AuthAck { .. }) => Ok(()),
            Ok(WsEvent::Unknown) => {
                debug!("Ignoring unknown event type");
                Ok(())
            }
            Err(e) => {
                warn!("Unparseable frame for {}: {}", self.address, e);
                Ok(())
            }
        }
    }
}

/// Server errors mentioning the token or auth mean the cached credentials
/// went stale; the worker reacts by clearing them and logging in again.
/// Everything else is a transient session failure.
fn classify_server_error(address: &str, reason: String) -> anyhow::Error {
    let lowered = reason.to_lowercase();
    if lowered.contains("auth") || lowered.contains("token") || lowered.contains("signature") {
        AuthError::TokenRejected {
            address: address.to_string(),
        }
        .into()
    } else {
        NetworkError::WebSocket { reason }.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_disconnected() {
        let session = FarmSession::new("0xabc", "{}");
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn stale_token_errors_are_flagged_as_auth() {
        let err = classify_server_error("0xabc", "Token expired".to_string());
        assert!(err.downcast_ref::<AuthError>().is_some());

        let err = classify_server_error("0xabc", "invalid signature".to_string());
        assert!(err.downcast_ref::<AuthError>().is_some());
    }

    #[test]
    fn other_server_errors_stay_transient() {
        let err = classify_server_error("0xabc", "internal server error".to_string());
        assert!(err.downcast_ref::<NetworkError>().is_some());
        assert!(err.downcast_ref::<AuthError>().is_none());
    }

    #[test]
    fn points_event_does_not_end_the_session() {
        let session = FarmSession::new("0xabc", "{}");
        let raw = r#"{"type":"points","data":{"today":3.0,"total":10.0}}"#;
        assert!(session.handle_event(raw).is_ok());
    }

    #[test]
    fn error_event_ends_the_session() {
        let session = FarmSession::new("0xabc", "{}");
        let raw = r#"{"type":"error","message":"token revoked"}"#;
        assert!(session.handle_event(raw).is_err());
    }
}
