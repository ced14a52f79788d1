//! straightedge-core library.
//!
//! Watches a stream of map edits, groups them by changeset and flags lines
//! whose points were moved onto a straight segment ("align nodes" abuse).
//!
//! The flow is [`event`] → [`engine::Engine`] → [`changeset::Changeset`] →
//! [`alignment::evaluate`] → [`detection::DetectionSink`], with prior point
//! versions read through a [`history::HistoryProvider`].
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums inside the engine, `anyhow::Result`
//!   at the loading edges (config, fixtures).
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

#![forbid(unsafe_code)]

pub mod alignment;
pub mod changeset;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod event;
pub mod history;
pub mod model;
pub mod regression;

pub use changeset::{CloseStats, ClosedChangeset};
pub use config::DetectorConfig;
pub use detection::{Detection, DetectionSink};
pub use engine::{BatchReport, Engine};
pub use error::{EngineError, ErrorCode};
pub use history::{HistoryProvider, MemoryHistory};
