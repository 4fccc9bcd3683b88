//! Nectar farmer: registers accounts against the Nectar service and keeps
//! their point-earning WebSocket sessions alive.

pub mod api;
pub mod config;
pub mod menu;
pub mod worker;

pub use config::BotConfig;
pub use worker::{FarmingWorker, RegistrationWorker, WorkerContext};
