//! Account workers: one registration run or one farming loop per key.

pub mod farming;
pub mod registration;

pub use farming::FarmingWorker;
pub use registration::RegistrationWorker;

use anyhow::Result;
use farm_core::{AccountStore, ProxyConfig};
use std::sync::Arc;
use tracing::debug;

use crate::config::BotConfig;

/// Shared state handed to every worker.
pub struct WorkerContext {
    pub store: AccountStore,
    pub config: BotConfig,
    pub proxies: Vec<ProxyConfig>,
}

impl WorkerContext {
    pub fn new(store: AccountStore, config: BotConfig, proxies: Vec<ProxyConfig>) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            proxies,
        })
    }
}

/// Pick the referral code for a registration.
///
/// Static mode always binds the operator's configured code. Pool mode draws
/// a random code harvested from earlier registrations so accounts refer each
/// other, falling back to the configured code while the pool is empty.
pub async fn choose_ref_code(ctx: &WorkerContext) -> Result<String> {
    if ctx.config.referral.static_mode {
        return Ok(ctx.config.referral.code.clone());
    }

    match ctx.store.random_ref_code().await? {
        Some(code) => {
            debug!("Drew referral code {} from the pool", code);
            Ok(code)
        }
        None => {
            debug!("Referral pool empty, using configured code");
            Ok(ctx.config.referral.code.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farm_core::AccountStore;
    use tempfile::TempDir;

    async fn context(static_mode: bool, dir: &TempDir) -> Arc<WorkerContext> {
        let store = AccountStore::new(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        let mut config = crate::config::tests_support::minimal_config();
        config.referral.static_mode = static_mode;
        config.referral.code = "OPERATOR".to_string();
        WorkerContext::new(store, config, Vec::new())
    }

    #[tokio::test]
    async fn static_mode_always_uses_configured_code() {
        let dir = TempDir::new().unwrap();
        let ctx = context(true, &dir).await;

        ctx.store.upsert_account("0xaaa", "0xkey").await.unwrap();
        ctx.store.save_ref_code("0xaaa", "POOLED").await.unwrap();

        for _ in 0..5 {
            assert_eq!(choose_ref_code(&ctx).await.unwrap(), "OPERATOR");
        }
    }

    #[tokio::test]
    async fn pool_mode_falls_back_when_empty() {
        let dir = TempDir::new().unwrap();
        let ctx = context(false, &dir).await;
        assert_eq!(choose_ref_code(&ctx).await.unwrap(), "OPERATOR");
    }

    #[tokio::test]
    async fn pool_mode_draws_harvested_codes() {
        let dir = TempDir::new().unwrap();
        let ctx = context(false, &dir).await;

        ctx.store.upsert_account("0xaaa", "0xkey").await.unwrap();
        ctx.store.save_ref_code("0xaaa", "POOLED").await.unwrap();

        assert_eq!(choose_ref_code(&ctx).await.unwrap(), "POOLED");
    }
}
