use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{ConfigError, DatabaseError};

/// Durable per-account record. `auth_token` and `ws_auth_payload` are the
/// cached credentials farming replays; either may be cleared when the remote
/// service rejects them.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRecord {
    pub id: i64,
    pub address: String,
    pub private_key: String,
    pub auth_token: Option<String>,
    pub ref_code: Option<String>,
    pub ws_auth_payload: Option<String>,
    pub last_proxy: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Default)]
pub struct StoreMetrics {
    pub total_queries: AtomicU64,
    pub total_errors: AtomicU64,
    pub total_inserts: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreMetricsSnapshot {
    pub total_queries: u64,
    pub total_errors: u64,
    pub total_inserts: u64,
}

/// SQLite-backed account store.
///
/// Use `Arc<AccountStore>` for shared ownership across workers; the pool
/// serialises writers so workers never coordinate directly.
#[derive(Debug)]
pub struct AccountStore {
    pool: SqlitePool,
    metrics: Arc<StoreMetrics>,
}

impl AccountStore {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;
    pub const DEFAULT_TIMEOUT_MS: u64 = 30000;

    pub async fn new(db_path: &str) -> Result<Self> {
        if !Path::new(db_path).exists() {
            std::fs::File::create(db_path).map_err(|e| ConfigError::IoError {
                path: db_path.to_string(),
                msg: e.to_string(),
            })?;
            info!("Created new database file: {}", db_path);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_millis(Self::DEFAULT_TIMEOUT_MS))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode=WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous=NORMAL;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&format!("sqlite://{}", db_path))
            .await
            .map_err(|e| DatabaseError::TransactionFailed { msg: e.to_string() })?;

        let store = Self {
            pool,
            metrics: Arc::new(StoreMetrics::default()),
        };
        store.init_schema().await?;
        info!(
            "Account store initialized with pool size {} (WAL mode)",
            Self::DEFAULT_MAX_CONNECTIONS
        );
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                address TEXT UNIQUE NOT NULL,
                private_key TEXT NOT NULL,
                auth_token TEXT,
                ref_code TEXT,
                ws_auth_payload TEXT,
                last_proxy TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::TransactionFailed { msg: e.to_string() })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_ref_code ON accounts(ref_code);")
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::TransactionFailed { msg: e.to_string() })?;

        Ok(())
    }

    /// Insert the account row if it does not exist yet.
    pub async fn upsert_account(&self, address: &str, private_key: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO accounts (address, private_key, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(address) DO NOTHING",
        )
        .bind(address)
        .bind(private_key)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        self.metrics.total_inserts.fetch_add(1, Ordering::SeqCst);
        self.track(result.is_ok());
        result
            .map(|_| ())
            .with_context(|| format!("Failed to upsert account {}", address))
    }

    pub async fn get_account(&self, address: &str) -> Result<Option<AccountRecord>> {
        let result = sqlx::query_as::<_, AccountRecord>(
            "SELECT id, address, private_key, auth_token, ref_code, ws_auth_payload,
                    last_proxy, created_at, updated_at
             FROM accounts WHERE address = ?",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await;

        self.track(result.is_ok());
        result.with_context(|| format!("Failed to load account {}", address))
    }

    pub async fn save_token(&self, address: &str, token: &str) -> Result<()> {
        self.update_column(address, "auth_token", Some(token)).await
    }

    pub async fn get_token(&self, address: &str) -> Result<Option<String>> {
        Ok(self.get_account(address).await?.and_then(|a| a.auth_token))
    }

    /// Drop a token the remote service rejected.
    pub async fn clear_token(&self, address: &str) -> Result<()> {
        self.update_column(address, "auth_token", None).await
    }

    pub async fn save_ref_code(&self, address: &str, code: &str) -> Result<()> {
        self.update_column(address, "ref_code", Some(code)).await
    }

    pub async fn save_ws_payload(&self, address: &str, payload: &str) -> Result<()> {
        self.update_column(address, "ws_auth_payload", Some(payload))
            .await
    }

    pub async fn get_ws_payload(&self, address: &str) -> Result<Option<String>> {
        Ok(self
            .get_account(address)
            .await?
            .and_then(|a| a.ws_auth_payload))
    }

    /// Discard a cached handshake after repeated auth failures.
    pub async fn clear_ws_payload(&self, address: &str) -> Result<()> {
        self.update_column(address, "ws_auth_payload", None).await
    }

    pub async fn save_last_proxy(&self, address: &str, proxy_url: &str) -> Result<()> {
        self.update_column(address, "last_proxy", Some(proxy_url))
            .await
    }

    /// Random referral code from the pool of successfully registered
    /// accounts. Empty pool yields None so callers can fall back to the
    /// configured code.
    pub async fn random_ref_code(&self) -> Result<Option<String>> {
        let result = sqlx::query_scalar::<_, String>(
            "SELECT ref_code FROM accounts
             WHERE ref_code IS NOT NULL
             ORDER BY RANDOM() LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await;

        self.track(result.is_ok());
        result.context("Failed to draw referral code from pool")
    }

    pub async fn count_accounts(&self) -> Result<i64> {
        let result = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await;

        self.track(result.is_ok());
        result.context("Failed to count accounts")
    }

    pub fn metrics_snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            total_queries: self.metrics.total_queries.load(Ordering::SeqCst),
            total_errors: self.metrics.total_errors.load(Ordering::SeqCst),
            total_inserts: self.metrics.total_inserts.load(Ordering::SeqCst),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn update_column(&self, address: &str, column: &str, value: Option<&str>) -> Result<()> {
        // Column names are fixed by the callers above, never user input.
        let sql = format!(
            "UPDATE accounts SET {} = ?, updated_at = ? WHERE address = ?",
            column
        );
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(now)
            .bind(address)
            .execute(&self.pool)
            .await;

        self.track(result.is_ok());
        match result {
            Ok(done) if done.rows_affected() == 0 => {
                error!("No account row for {} while updating {}", address, column);
                Err(DatabaseError::NotFound {
                    key: address.to_string(),
                }
                .into())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to update {} for {}", column, address)),
        }
    }

    fn track(&self, ok: bool) {
        self.metrics.total_queries.fetch_add(1, Ordering::SeqCst);
        if !ok {
            self.metrics.total_errors.fetch_add(1, Ordering::SeqCst);
        }
    }
}
