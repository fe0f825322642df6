//! # Check-in Backend
//!
//! Weekly check-in compliance engine.
//!
//! Members of an organization submit one check-in per custom week. The engine answers, for
//! any week, who submitted (pending or reviewed), who did not (missing), who was away (on
//! vacation) and whose status could not be determined. It also keeps the roster in line with
//! an external directory such as a Slack channel.
//!
//! ## Architecture
//!
//! - [`models`]: Domain types and the week calendar
//! - [`db`]: Repository traits, in-memory and Postgres stores, configuration
//! - [`directory`]: External membership providers
//! - [`services`]: Classifier, roster reconciler and the [`services::CheckinEngine`] facade
//! - [`http`]: Axum-based HTTP shim

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod db;
pub mod directory;
pub mod models;
pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
