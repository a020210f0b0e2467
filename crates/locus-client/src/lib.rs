//! Locus Client - HTTP client for the Business Profile APIs
//!
//! This crate provides [`BusinessProfileClient`], the production
//! implementation of [`locus_core::traits::InsightsApi`]. It lists accounts
//! and locations and requests aggregated weekly insights.
//!
//! # Overview
//!
//! The client handles bearer authentication, request building, pagination,
//! response parsing, and the mapping of API error bodies onto per-call error
//! pages that the fetch engine can shrink around.

pub mod business_profile;

pub use business_profile::BusinessProfileClient;
