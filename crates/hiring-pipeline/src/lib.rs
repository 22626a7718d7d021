//! Staged hiring pipeline: per-job stage registries, per-application trackers and the pure
//! decision engine that moves candidates between stages, plus the axum surface that exposes
//! them.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;
