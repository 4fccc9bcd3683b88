//! # Farm Core - Shared Utilities for the Nectar Farmer
//!
//! This crate provides the pieces shared by every account worker: the
//! account store, retry/rotation control, proxy handling, key loading,
//! logging setup, and the worker runner.
//!
//! ## Modules
//!
//! - [`config`] - Shared configuration structures
//! - [`database`] - Async SQLite account store with connection pooling
//! - [`error`] - Typed error handling with thiserror
//! - [`traits`] - Core trait definitions
//! - [`utils`] - Utility modules (keys, proxies, retry, runner, logging)

// Module declarations - internal modules marked pub(crate)
pub mod config;
pub mod database;
pub mod error;
pub mod traits;
pub(crate) mod utils;

// Selective exports - only public API types
pub use config::{DelayRange, ProxyConfig, RetryPolicy};
pub use database::{AccountRecord, AccountStore, StoreMetricsSnapshot};
pub use error::{AuthError, ConfigError, CoreError, DatabaseError, NetworkError, ProxyError};
pub use traits::{Worker, WorkerReport};

// Utils are pub(crate) - only export specific public utilities
pub use utils::{parse_level, setup_logger, short_address, KeyLoader, ProxyManager, ProxyRotator, WorkerRunner};

// Export retry utilities for workers and tests
pub use utils::retry::{
    sleep_cancellable, with_retry, RetryAction, RetryController, RetryMode,
};

// Proxy tunneling is public so the WebSocket client can dial through it
pub use utils::tunnel::dial as dial_through_proxy;
