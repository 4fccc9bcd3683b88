use anyhow::{Context, Result};
use chrono::SecondsFormat;
use ethers::signers::{LocalWallet, Signer};
use ethers::utils::to_checksum;
use farm_core::{AuthError, NetworkError, ProxyConfig};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{ApiEnvelope, InviteCode, LoginData, NonceData, SignedAuth, UserInfoData, WsRequest};

pub const API_URL: &str = "https://backend.nectar.gg/api/service";
const APP_URI: &str = "https://app.nectar.gg";
const HTTP_CHAIN_ID: &str = "42000";
const WS_CHAIN_ID: &str = "1";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Per-account HTTP client. Holds the signer, the negotiated bearer token,
/// and the last nonce; one instance per worker, rebuilt on proxy rotation.
pub struct ApiClient {
    http: Client,
    wallet: LocalWallet,
    address: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(private_key: &str, proxy: Option<&ProxyConfig>) -> Result<Self> {
        let wallet: LocalWallet = private_key
            .parse()
            .map_err(|_| AuthError::InvalidKeyFormat)?;
        let address = to_checksum(&wallet.address(), None);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
            ),
        );

        let mut client_builder = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));

        if let Some(proxy_conf) = proxy {
            let mut http_proxy = reqwest::Proxy::all(&proxy_conf.url)?;
            if let (Some(u), Some(p)) = (&proxy_conf.username, &proxy_conf.password) {
                http_proxy = http_proxy.basic_auth(u, p);
            }
            client_builder = client_builder.proxy(http_proxy);
        }

        Ok(Self {
            http: client_builder.build()?,
            wallet,
            address,
            token: None,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Adopt a token cached in the store instead of logging in again.
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub async fn fetch_nonce(&self) -> Result<String> {
        let url = format!("{}/auth/{}/nonce", API_URL, self.address);
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, "Bearer null")
            .send()
            .await
            .map_err(|e| classify_transport_error(&url, e))?;

        let envelope: ApiEnvelope<NonceData> = Self::parse(&url, response).await?;
        match envelope.data {
            Some(data) if envelope.success => Ok(data.nonce),
            _ => Err(NetworkError::InvalidResponse {
                endpoint: url,
                reason: envelope.msg.unwrap_or_else(|| "missing nonce".to_string()),
            }
            .into()),
        }
    }

    /// Nonce, signed sign-in message, token. Stores the bearer token on
    /// success.
    pub async fn login(&mut self) -> Result<String> {
        let nonce = self.fetch_nonce().await?;
        let auth = self.sign_auth(&nonce, HTTP_CHAIN_ID).await?;

        let url = format!("{}/auth/login", API_URL);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, "Bearer null")
            .json(&serde_json::json!({
                "message": auth.message,
                "signature": auth.signature,
            }))
            .send()
            .await
            .map_err(|e| classify_transport_error(&url, e))?;

        let envelope: ApiEnvelope<LoginData> = Self::parse(&url, response).await?;
        match envelope.data {
            Some(data) if envelope.success => {
                debug!("Login succeeded for {}", self.address);
                self.token = Some(data.token.clone());
                Ok(data.token)
            }
            _ => Err(AuthError::LoginRejected {
                address: self.address.clone(),
                reason: envelope.msg.unwrap_or_else(|| "login refused".to_string()),
            }
            .into()),
        }
    }

    pub async fn user_info(&self) -> Result<UserInfoData> {
        let url = format!("{}/user/info", API_URL);
        let envelope: ApiEnvelope<UserInfoData> = self.get_authorized(&url).await?;
        envelope.data.context("user info response carried no data")
    }

    pub async fn bind_referral(&self, code: &str) -> Result<()> {
        let url = format!("{}/referral/bind", API_URL);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, self.bearer()?)
            .json(&serde_json::json!({ "invite_code": code }))
            .send()
            .await
            .map_err(|e| classify_transport_error(&url, e))?;

        let envelope: ApiEnvelope<serde_json::Value> = Self::parse(&url, response).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(NetworkError::InvalidResponse {
                endpoint: url,
                reason: envelope
                    .msg
                    .unwrap_or_else(|| "referral bind refused".to_string()),
            }
            .into())
        }
    }

    /// The invite codes this account generated after registering.
    pub async fn invite_codes(&self) -> Result<Vec<InviteCode>> {
        let url = format!("{}/referral/codes", API_URL);
        let envelope: ApiEnvelope<Vec<InviteCode>> = self.get_authorized(&url).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    /// Produce the signed WebSocket handshake message, serialized exactly as
    /// it will be replayed on reconnects.
    pub async fn ws_auth_payload(&self) -> Result<String> {
        let nonce = self.fetch_nonce().await?;
        let auth = self.sign_auth(&nonce, WS_CHAIN_ID).await?;
        let message = WsRequest::Auth { data: auth };
        serde_json::to_string(&message).context("Failed to serialize ws auth payload")
    }

    async fn sign_auth(&self, nonce: &str, chain_id: &str) -> Result<SignedAuth> {
        let message = self.build_signin_message(nonce, chain_id);
        let signature = self
            .wallet
            .sign_message(message.as_bytes())
            .await
            .context("Failed to sign auth message")?;

        Ok(SignedAuth {
            user_id: self.address.clone(),
            message,
            signature: format!("0x{}", signature),
        })
    }

    fn build_signin_message(&self, nonce: &str, chain_id: &str) -> String {
        let issued_at = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        format!(
            "nectar.gg wants you to sign in with your Ethereum account:\n\
             {address}\n\n\
             By signing, you prove ownership of this wallet and log in. \
             This does not initiate a transaction or cost any fees.\n\n\
             URI: {uri}\n\
             Version: 1\n\
             Chain ID: {chain_id}\n\
             Nonce: {nonce}\n\
             Issued At: {issued_at}",
            address = self.address,
            uri = APP_URI,
        )
    }

    fn bearer(&self) -> Result<String> {
        let token = self.token.as_deref().ok_or_else(|| AuthError::TokenRejected {
            address: self.address.clone(),
        })?;
        Ok(format!("Bearer {}", token))
    }

    async fn get_authorized<T: DeserializeOwned>(&self, url: &str) -> Result<ApiEnvelope<T>> {
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, self.bearer()?)
            .send()
            .await
            .map_err(|e| classify_transport_error(url, e))?;
        Self::parse(url, response).await
    }

    async fn parse<T: DeserializeOwned>(url: &str, response: Response) -> Result<ApiEnvelope<T>> {
        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => {
                return Err(AuthError::TokenRejected {
                    address: String::new(),
                }
                .into())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(NetworkError::RateLimited {
                    endpoint: url.to_string(),
                }
                .into())
            }
            s if !s.is_success() => {
                return Err(NetworkError::HttpError {
                    status_code: s.as_u16(),
                    endpoint: url.to_string(),
                }
                .into())
            }
            _ => {}
        }

        response
            .json::<ApiEnvelope<T>>()
            .await
            .map_err(|e| {
                NetworkError::InvalidResponse {
                    endpoint: url.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }
}

fn classify_transport_error(url: &str, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        NetworkError::Timeout {
            timeout_ms: REQUEST_TIMEOUT_SECS * 1000,
            endpoint: url.to_string(),
        }
        .into()
    } else {
        NetworkError::ConnectionFailed {
            endpoint: url.to_string(),
            reason: error.to_string(),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe51296170827936ea5cce4b76994b0f";

    #[test]
    fn derives_checksummed_address_from_key() {
        let client = ApiClient::new(TEST_KEY, None).unwrap();
        assert!(client.address().starts_with("0x"));
        assert_eq!(client.address().len(), 42);
        // EIP-55 mixes case; a fully lowercased address would be a bug.
        assert_ne!(client.address(), &client.address().to_lowercase());
    }

    #[test]
    fn rejects_malformed_key() {
        assert!(ApiClient::new("not-a-key", None).is_err());
    }

    #[test]
    fn signin_message_carries_nonce_and_chain() {
        let client = ApiClient::new(TEST_KEY, None).unwrap();
        let message = client.build_signin_message("n0nce-1", "42000");

        assert!(message.contains(client.address()));
        assert!(message.contains("Nonce: n0nce-1"));
        assert!(message.contains("Chain ID: 42000"));
        assert!(message.contains("Issued At: "));
    }

    #[tokio::test]
    async fn ws_payload_round_trips_as_auth_message() {
        let client = ApiClient::new(TEST_KEY, None).unwrap();
        let auth = client.sign_auth("abc", "1").await.unwrap();

        assert_eq!(auth.user_id, client.address());
        assert!(auth.signature.starts_with("0x"));
        // 65-byte signature, hex encoded.
        assert_eq!(auth.signature.len(), 132);

        let raw = serde_json::to_string(&WsRequest::Auth { data: auth }).unwrap();
        assert!(raw.contains(r#""type":"auth""#));
    }

    #[test]
    fn bearer_requires_token() {
        let mut client = ApiClient::new(TEST_KEY, None).unwrap();
        assert!(client.bearer().is_err());

        client.set_token("jwt".to_string());
        assert_eq!(client.bearer().unwrap(), "Bearer jwt");
    }
}
