//! `baseline` library crate.
//!
//! The binary (`baseline`) is a thin wrapper around this library so that:
//!
//! - the estimation core is testable without spawning processes
//! - hosts can run sessions directly (`fit::estimate`, `fit::estimate_sessions`)
//!
//! The core (`domain`, `math`, `fit`, `report`) performs no I/O; `io`, `data`
//! and `app` surround it.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod report;
