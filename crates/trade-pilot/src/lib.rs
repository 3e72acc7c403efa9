pub mod config;
pub mod metrics;
pub mod notifier;
pub mod peak_store;
pub mod pipeline;
pub mod planner;
pub mod submitter;
pub mod supervisor;
pub mod types;
