//! # Core Error Types
//!
//! Centralized error definitions for the farm-core crate.
//! All errors implement `std::error::Error` and `std::fmt::Display`.

use thiserror::Error;

/// Unified error type for farm-core operations.
///
/// This enum wraps all specific error types and provides a unified
/// error interface for the application layer.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Config(ConfigError),

    #[error("Database error: {0}")]
    Database(DatabaseError),

    #[error(transparent)]
    Network(NetworkError),

    #[error(transparent)]
    Auth(AuthError),

    #[error(transparent)]
    Proxy(ProxyError),

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::Config(e)
    }
}

impl From<DatabaseError> for CoreError {
    fn from(e: DatabaseError) -> Self {
        CoreError::Database(e)
    }
}

impl From<NetworkError> for CoreError {
    fn from(e: NetworkError) -> Self {
        CoreError::Network(e)
    }
}

impl From<AuthError> for CoreError {
    fn from(e: AuthError) -> Self {
        CoreError::Auth(e)
    }
}

impl From<ProxyError> for CoreError {
    fn from(e: ProxyError) -> Self {
        CoreError::Proxy(e)
    }
}

/// Configuration-related errors. Fatal at startup.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Missing required configuration field: '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error reading {path}: {msg}")]
    IoError { path: String, msg: String },
}

/// Transient network failures. Always absorbed by the retry controller
/// and never surface past a single account's loop.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Request timeout after {timeout_ms}ms to {endpoint}")]
    Timeout { timeout_ms: u64, endpoint: String },

    #[error("Rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    #[error("Connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("HTTP error {status_code} from {endpoint}")]
    HttpError { status_code: u16, endpoint: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("WebSocket error: {reason}")]
    WebSocket { reason: String },
}

/// Account-level authentication failures. The account is skipped for the
/// current cycle instead of being retried indefinitely.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Login rejected for {address}: {reason}")]
    LoginRejected { address: String, reason: String },

    #[error("Token rejected by server for {address}")]
    TokenRejected { address: String },

    #[error("Handshake rejected for {address}: {reason}")]
    HandshakeRejected { address: String, reason: String },

    #[error("Invalid private key format: expected 0x-prefixed hex string")]
    InvalidKeyFormat,
}

/// Proxy pool failures.
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    #[error("Proxy pool exhausted after {tried} proxies")]
    Exhausted { tried: usize },

    #[error("Invalid proxy line: '{line}'")]
    InvalidLine { line: String },

    #[error("Proxy tunnel to {target} via {proxy} failed: {reason}")]
    TunnelFailed {
        proxy: String,
        target: String,
        reason: String,
    },
}

/// Database operation errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection pool exhausted (max: {max_size})")]
    PoolExhausted { max_size: u32 },

    #[error("Transaction failed: {msg}")]
    TransactionFailed { msg: String },

    #[error("Query returned no rows for key: {key}")]
    NotFound { key: String },
}
