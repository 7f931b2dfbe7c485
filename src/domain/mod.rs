//! Domain types used throughout the estimation pipeline.
//!
//! This module defines:
//!
//! - epochs and baselines (`Epoch`, `Baseline`)
//! - the observation model (`Observation`)
//! - EOP naming, units and the a priori EOP table (`EopComponent`, `AprioriEopSeries`)
//! - the parameter index space (`ParameterVector`)
//! - run configuration, session input and solution output

pub mod eop;
pub mod epoch;
pub mod observation;
pub mod parameters;
pub mod types;

pub use eop::*;
pub use epoch::*;
pub use observation::*;
pub use parameters::*;
pub use types::*;
