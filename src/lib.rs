//! pr-herd - evaluate and merge pull requests across hosting services
//!
//! Each configured repository is fetched through a [`platform::Provider`],
//! its open PRs are classified by the [`evaluate::ReadinessEvaluator`], and
//! the ready ones are merged concurrently by the
//! [`orchestrator::MergeOrchestrator`]. Every provider call goes through the
//! [`behavior::BehaviorManager`] for rate limiting and retry.

pub mod auth;
pub mod behavior;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod executor;
pub mod orchestrator;
pub mod platform;
pub mod types;

pub use error::{Error, ErrorKind, Result};
