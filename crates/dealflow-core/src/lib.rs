//! Dealflow Core — workflow orchestration for deal-flow advisory pipelines.
//!
//! A free-text request is classified as buyer-side M&A, seller-side M&A or
//! IPO, mapped to a fixed sequence of advisory steps, and executed one step
//! at a time against an external reasoning service. Every transition is
//! persisted through a [`workflow::RunRecorder`].
//!
//! The crate has no front-end. The `dealflow` CLI and tests drive it
//! through [`service::RunService`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;
pub mod state;
pub mod store;
pub mod workflow;

// Convenience re-exports
pub use config::EngineConfig;
pub use db::Database;
pub use error::DealflowError;
pub use service::RunService;
pub use state::{AppState, AppStateInner};
