use anyhow::Result;
use async_trait::async_trait;
use farm_core::{
    short_address, sleep_cancellable, with_retry, AuthError, ProxyConfig, ProxyRotator,
    RetryAction, RetryController, RetryMode, Worker, WorkerReport,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::WorkerContext;
use crate::api::{ApiClient, FarmSession, SessionEnd};

/// Keeps one account's farming connection alive. Sessions reconnect forever;
/// the worker only returns when cancelled.
pub struct FarmingWorker {
    ctx: Arc<WorkerContext>,
    private_key: String,
    address: String,
    index: usize,
}

impl FarmingWorker {
    pub fn new(ctx: Arc<WorkerContext>, private_key: String, index: usize) -> Result<Self> {
        let client = ApiClient::new(&private_key, None)?;
        let address = client.address().to_string();
        Ok(Self {
            ctx,
            private_key,
            address,
            index,
        })
    }

    /// Cached payload when available, otherwise a fresh login and signature
    /// stored for the next reconnect.
    async fn auth_payload(&self, proxy: Option<&ProxyConfig>) -> Result<String> {
        if let Some(payload) = self.ctx.store.get_ws_payload(&self.address).await? {
            return Ok(payload);
        }

        info!("{} has no cached session, logging in", self.short());
        let mut client = ApiClient::new(&self.private_key, proxy)?;
        if let Some(token) = self.ctx.store.get_token(&self.address).await? {
            client.set_token(token);
        } else {
            let token = client.login().await?;
            self.ctx.store.save_token(&self.address, &token).await?;
        }

        let payload = with_retry(
            2,
            std::time::Duration::from_secs(2),
            "ws payload signing",
            || client.ws_auth_payload(),
        )
        .await?;
        self.ctx.store.save_ws_payload(&self.address, &payload).await?;
        Ok(payload)
    }

    /// Stale credentials force a full re-login on the next cycle.
    async fn clear_credentials(&self) -> Result<()> {
        self.ctx.store.clear_token(&self.address).await?;
        self.ctx.store.clear_ws_payload(&self.address).await?;
        Ok(())
    }

    fn short(&self) -> String {
        short_address(&self.address)
    }
}

#[async_trait]
impl Worker for FarmingWorker {
    fn account(&self) -> &str {
        &self.address
    }

    async fn run(&self, cancel: CancellationToken) -> Result<WorkerReport> {
        self.ctx
            .store
            .upsert_account(&self.address, &self.private_key)
            .await?;

        let mut rotator = ProxyRotator::new(
            self.ctx.proxies.clone(),
            ProxyRotator::assign(&self.ctx.proxies, self.index),
        );
        let mut controller =
            RetryController::new(self.ctx.config.retry, RetryMode::Farming);

        loop {
            if cancel.is_cancelled() {
                return Ok(WorkerReport::succeeded());
            }

            let proxy = rotator.current().cloned();
            let outcome = async {
                let payload = self.auth_payload(proxy.as_ref()).await?;
                let mut session = FarmSession::new(&self.address, &payload);
                session.run(proxy.as_ref(), &cancel).await
            }
            .await;

            match outcome {
                Ok(SessionEnd::Cancelled) => {
                    info!("{} farming stopped", self.short());
                    return Ok(WorkerReport::succeeded());
                }
                Ok(SessionEnd::ServerClosed) => {
                    // Clean close; reconnect on the same credentials after
                    // the standard delay.
                    controller.on_success();
                    warn!("{} session closed by server, reconnecting", self.short());
                    if !sleep_cancellable(
                        std::time::Duration::from_secs(self.ctx.config.retry.delay_seconds),
                        &cancel,
                    )
                    .await
                    {
                        return Ok(WorkerReport::succeeded());
                    }
                }
                Err(e) => {
                    if e.downcast_ref::<AuthError>().is_some() {
                        warn!("{} credentials rejected, re-authenticating", self.short());
                        self.clear_credentials().await?;
                    } else {
                        warn!(
                            "{} farming attempt {} failed: {:#}",
                            self.short(),
                            controller.attempt(),
                            e
                        );
                    }

                    match controller.on_failure() {
                        RetryAction::RetryAfter(delay) => {
                            if !sleep_cancellable(delay, &cancel).await {
                                return Ok(WorkerReport::succeeded());
                            }
                        }
                        RetryAction::FarmingWait { wait, rotate } => {
                            warn!(
                                "{} backing off {}s before reconnecting",
                                self.short(),
                                wait.as_secs()
                            );
                            if !sleep_cancellable(wait, &cancel).await {
                                return Ok(WorkerReport::succeeded());
                            }
                            if rotate {
                                rotator.next();
                            }
                        }
                        // Farming never abandons.
                        RetryAction::RotateProxy | RetryAction::Abandon => {
                            rotator.next();
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests_support::minimal_config;
    use farm_core::AccountStore;
    use tempfile::TempDir;

    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe51296170827936ea5cce4b76994b0f";

    async fn context(dir: &TempDir) -> Arc<WorkerContext> {
        let store = AccountStore::new(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        WorkerContext::new(store, minimal_config(), Vec::new())
    }

    #[tokio::test]
    async fn cached_payload_is_replayed_without_login() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        let worker = FarmingWorker::new(ctx.clone(), TEST_KEY.to_string(), 0).unwrap();
        let address = worker.account().to_string();

        let cached = r#"{"type":"auth","data":{"signature":"0xcafe"}}"#;
        ctx.store.upsert_account(&address, TEST_KEY).await.unwrap();
        ctx.store.save_ws_payload(&address, cached).await.unwrap();

        // Reconnects reuse the stored handshake untouched.
        let payload = worker.auth_payload(None).await.unwrap();
        assert_eq!(payload, cached);
        let payload = worker.auth_payload(None).await.unwrap();
        assert_eq!(payload, cached);

        // No login happened on the fast path: no bearer token was stored.
        assert!(ctx.store.get_token(&address).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clearing_credentials_drops_token_and_payload() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        let worker = FarmingWorker::new(ctx.clone(), TEST_KEY.to_string(), 0).unwrap();
        let address = worker.account().to_string();

        ctx.store.upsert_account(&address, TEST_KEY).await.unwrap();
        ctx.store.save_token(&address, "stale-jwt").await.unwrap();
        ctx.store.save_ws_payload(&address, "{}").await.unwrap();

        worker.clear_credentials().await.unwrap();

        assert!(ctx.store.get_token(&address).await.unwrap().is_none());
        assert!(ctx.store.get_ws_payload(&address).await.unwrap().is_none());
    }
}
