//! Load generation against an in-memory executor.
//!
//! ## Structure
//!
//! - [`config`] - CLI/environment configuration.
//! - [`driver`] - write/read phases fanned out over concurrent submitters.
//! - [`telemetry`] - console log subscriber.

pub mod config;
pub mod driver;
pub mod telemetry;
