//! # Utilities Module
//!
//! Internal utility modules for the farm-core crate.
//! These modules are marked as `pub(crate)` to enforce API boundaries.

// Internal modules - not part of public API
pub(crate) mod keys;
pub(crate) mod logger;
pub(crate) mod proxy_manager;
pub(crate) mod retry;
pub(crate) mod runner;
pub(crate) mod tunnel;

// Selective exports - only public utilities
pub use keys::KeyLoader;
pub use logger::{parse_level, setup_logger, short_address};
pub use proxy_manager::{ProxyManager, ProxyRotator};
pub use runner::WorkerRunner;
