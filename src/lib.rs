//! # fedingest
//!
//! Ingestion pipeline for federated content delivered at-least-once and
//! in no particular order. Turns remote create/share/delete activities
//! into local rows exactly once, whatever order or multiplicity the
//! network delivers them in.
//!
//! ## Architecture
//!
//! ```text
//! InboundActivity ──▶ classifier ──▶ creation ─┐
//!                          │                   ├─▶ materializer ──▶ SQLite
//!                          ├──────▶ share ─────┘        │
//!                          │                            ▼
//!                          └──────▶ deletion       job queue
//!                                      │        (post-commit work)
//!                                      ▼
//!                             tombstone cache
//! ```
//!
//! Coordination (per-activity lock, deletion tombstones) sits behind
//! traits in [`coord`]; everything the pipeline does not own (remote
//! fetch, removal side effects, notifications, domain policy) behind
//! traits in [`ingest::collaborators`].

pub mod config;
pub mod coord;
pub mod data;
pub mod error;
pub mod ingest;
pub mod metrics;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use ingest::{IngestOptions, IngestPipeline, Outcome, SkipReason};

/// Initialize the tracing subscriber from logging configuration.
///
/// Call once at process start. `RUST_LOG` overrides the configured
/// level when set.
pub fn init_tracing(logging: &config::LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));

    match logging.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
