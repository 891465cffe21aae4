pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger_pruner;
pub mod redis_usage;
pub mod setup;
pub mod stripe_client;

pub use error::InfraError;
