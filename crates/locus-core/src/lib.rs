//! Locus Core - Domain types, harvest logic, and services.
//!
//! This crate provides the core functionality for Locus, including:
//!
//! - **Domain models**: [`Location`], [`InsightRecord`], [`Marker`], [`Window`]
//! - **Harvest logic**: batch planning, the fetch-retry engine, window covering
//! - **Services**: [`ResumeDriver`] for one pass, [`Pipeline`] for the
//!   five-trigger state machine, [`WorkerService`] for firing due triggers
//! - **Traits**: [`InsightsApi`], [`HarvestStore`], [`TriggerScheduler`] for
//!   dependency injection
//! - **Progress reporting**: [`ProgressReporter`] trait for decoupled logging
//!
//! # Architecture
//!
//! Business logic is decoupled from I/O through traits:
//!
//! - [`InsightsApi`] - abstracts the remote Business Profile APIs
//! - [`HarvestStore`] - abstracts the tabular store (e.g., PostgreSQL)
//! - [`TriggerScheduler`] - abstracts the named recurring triggers
//!
//! # Example
//!
//! ```ignore
//! use locus_core::{Pipeline, Trigger};
//! use locus_core::progress::TracingReporter;
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = Pipeline::new(store, client, scheduler);
//! pipeline.refresh_accounts().await?;
//! pipeline.start(Utc::now(), &CancellationToken::new(), &TracingReporter).await?;
//! ```

pub mod batch;
pub mod config;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod marker;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod schema;
pub mod stats;
pub mod traits;
pub mod trigger;
pub mod window;
pub mod worker;

// Configuration
pub use config::{
    AccountEntry, DbConfig, DriverConfig, FetchConfig, HttpConfig, LocusConfig,
    default_config_path, load_config,
};

// Error handling
pub use error::AppError;

// Domain models
pub use marker::Marker;
pub use models::{
    Account, AccountConfig, InsightRecord, InsightsPage, Location, LocationFilter, LogEntry,
    MetricValues, NewAccountConfig, NewLocation, PassKind, StoreStats,
};
pub use schema::Metric;
pub use window::{RetentionWeeks, Window};

// Pass outcomes
pub use stats::{BatchOutcome, CoverResult, CoverStats, PassStatus, SuspendReason};

// Progress reporting
pub use progress::{HarvestEvent, ProgressReporter, SilentReporter, TracingReporter};

// Traits for dependency injection
pub use scheduler::TriggerScheduler;
pub use traits::{HarvestStore, InsightsApi};

// Services (generic over trait implementations)
pub use driver::ResumeDriver;
pub use fetch::{FetchEngine, FetchOutcome};
pub use pipeline::Pipeline;

// Triggers and worker
pub use trigger::{ArmedTrigger, Cadence, Trigger, WorkerConfig};
pub use worker::{
    SilentWorkerReporter, TracingWorkerReporter, WorkerEvent, WorkerReporter, WorkerService,
};
