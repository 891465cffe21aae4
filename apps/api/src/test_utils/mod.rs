//! Test utilities.
//!
//! This module provides:
//! - Test data factories for plans and subscriptions
//! - Builders for signed provider webhook payloads
//! - In-memory repository implementations for mocking persistence
//! - `TestAppStateBuilder` for route tests

mod app_state_builder;
mod billing_mocks;
mod factories;
mod provider_events;

pub use app_state_builder::*;
pub use billing_mocks::*;
pub use factories::*;
pub use provider_events::*;
