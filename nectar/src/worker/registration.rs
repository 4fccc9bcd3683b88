use anyhow::Result;
use async_trait::async_trait;
use farm_core::{
    short_address, sleep_cancellable, with_retry, AuthError, ProxyConfig, ProxyRotator,
    RetryAction, RetryController, RetryMode, Worker, WorkerReport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{choose_ref_code, WorkerContext};
use crate::api::ApiClient;

/// Registers one account: sign-in, referral bind, invite-code harvest, and
/// the pre-signed WebSocket payload cached for the farming phase.
pub struct RegistrationWorker {
    ctx: Arc<WorkerContext>,
    private_key: String,
    address: String,
    index: usize,
}

impl RegistrationWorker {
    pub fn new(ctx: Arc<WorkerContext>, private_key: String, index: usize) -> Result<Self> {
        // Parse the key once up front so malformed keys fail before any
        // network work is scheduled.
        let client = ApiClient::new(&private_key, None)?;
        let address = client.address().to_string();
        Ok(Self {
            ctx,
            private_key,
            address,
            index,
        })
    }

    async fn register_once(&self, proxy: Option<&ProxyConfig>) -> Result<()> {
        let mut client = ApiClient::new(&self.private_key, proxy)?;

        let token = client.login().await?;
        self.ctx.store.save_token(&self.address, &token).await?;

        // The post-login reads are idempotent, so each gets a short inner
        // retry before the whole registration attempt is counted as failed.
        let inner_delay = Duration::from_secs(2);

        // Bind a referral only for accounts that were never referred.
        let info = with_retry(2, inner_delay, "user info fetch", || client.user_info()).await?;
        let already_bound = info
            .referral
            .as_ref()
            .and_then(|r| r.invite_code.as_ref())
            .is_some();
        if already_bound {
            info!("{} already has a referrer, skipping bind", self.short());
        } else {
            let code = choose_ref_code(&self.ctx).await?;
            client.bind_referral(&code).await?;
            info!("{} bound referral code {}", self.short(), code);
        }

        // Harvest this account's own invite code into the pool.
        let codes = with_retry(2, inner_delay, "invite code fetch", || {
            client.invite_codes()
        })
        .await?;
        if let Some(own) = codes.iter().find(|c| c.enabled) {
            self.ctx.store.save_ref_code(&self.address, &own.code).await?;
        } else {
            warn!("{} returned no enabled invite code", self.short());
        }

        // Pre-sign the WebSocket handshake so farming can start without a
        // fresh signature.
        let payload = with_retry(2, inner_delay, "ws payload signing", || {
            client.ws_auth_payload()
        })
        .await?;
        self.ctx.store.save_ws_payload(&self.address, &payload).await?;

        if let Some(p) = proxy {
            self.ctx.store.save_last_proxy(&self.address, &p.url).await?;
        }

        Ok(())
    }

    fn short(&self) -> String {
        short_address(&self.address)
    }
}

#[async_trait]
impl Worker for RegistrationWorker {
    fn account(&self) -> &str {
        &self.address
    }

    async fn run(&self, cancel: CancellationToken) -> Result<WorkerReport> {
        if self.ctx.store.get_token(&self.address).await?.is_some() {
            info!("{} already registered, skipping", self.short());
            return Ok(WorkerReport::skipped());
        }

        self.ctx
            .store
            .upsert_account(&self.address, &self.private_key)
            .await?;

        let mut rotator = ProxyRotator::new(
            self.ctx.proxies.clone(),
            ProxyRotator::assign(&self.ctx.proxies, self.index),
        );
        let mut controller =
            RetryController::new(self.ctx.config.retry, RetryMode::Registration);

        loop {
            if cancel.is_cancelled() {
                return Ok(WorkerReport::skipped());
            }

            let proxy = rotator.current().cloned();
            match self.register_once(proxy.as_ref()).await {
                Ok(()) => {
                    controller.on_success();
                    info!("{} registered SUCCESS", self.short());
                    return Ok(WorkerReport::succeeded());
                }
                Err(e) => {
                    if e.downcast_ref::<AuthError>()
                        .map(|a| matches!(a, AuthError::InvalidKeyFormat))
                        .unwrap_or(false)
                    {
                        error!("{} has an invalid key, giving up", self.short());
                        return Ok(WorkerReport::failed());
                    }

                    warn!(
                        "{} registration attempt {} failed: {:#}",
                        self.short(),
                        controller.attempt(),
                        e
                    );
                    match controller.on_failure() {
                        RetryAction::RetryAfter(delay) => {
                            if !sleep_cancellable(delay, &cancel).await {
                                return Ok(WorkerReport::skipped());
                            }
                        }
                        RetryAction::RotateProxy => {
                            rotator.next();
                        }
                        RetryAction::Abandon => {
                            error!("{} registration FAILED, abandoning account", self.short());
                            return Ok(WorkerReport::failed());
                        }
                        // Farming-only action; this controller never emits it.
                        RetryAction::FarmingWait { .. } => {
                            return Ok(WorkerReport::failed());
                        }
                    }
                }
            }
        }
    }
}
