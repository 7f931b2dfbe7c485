//! The estimation engine.
//!
//! Responsibilities:
//!
//! - assemble the design matrix from active observations (`design`)
//! - form and solve the weighted normal equations (`normal`, `solver`)
//! - iterate solve + outlier rejection to convergence (`screening`)
//! - run whole sessions, one or many in parallel (`estimator`)

pub mod design;
pub mod estimator;
pub mod normal;
pub mod screening;
pub mod solver;

pub use design::*;
pub use estimator::*;
pub use normal::*;
pub use screening::*;
pub use solver::*;
