//! Services: HTTP access, session handling, aggregation and polling

pub mod aggregator;
pub mod catalogue;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod endpoints;
pub mod gateway;
pub mod session;

pub use aggregator::Aggregator;
pub use client::ApiClient;
pub use config::{Config, ConfigOverrides};
pub use coordinator::{PollingCoordinator, RefreshOutcome, WindowPolicy};
