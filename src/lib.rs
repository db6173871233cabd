//! Crowd-watch library
//!
//! Real-time crowd metric ingestion, alerting and risk analysis, plus the
//! video crowd estimator. Exposed as a library for the binaries and the
//! integration tests.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
