pub mod plan;
pub mod provider_event;
pub mod subscription;
pub mod usage_period;
pub mod webhook_event;
