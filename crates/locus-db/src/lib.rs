//! Locus DB - PostgreSQL repository layer
//!
//! This crate provides the repository pattern for harvest persistence.
//!
//! # Overview
//!
//! The main components are:
//! - [`HarvestRepository`] - Accounts, configuration, locations with their
//!   progress markers, insight rows and the audit log
//! - [`TriggerRepository`] - Persistent trigger schedule with safe concurrent
//!   claiming
//! - [`ensure_schema`] - Creates the tables on first run

mod harvest_repository;
mod schema;
mod trigger_repository;

pub use harvest_repository::HarvestRepository;
pub use schema::{MIGRATIONS, ensure_schema};
pub use trigger_repository::TriggerRepository;
