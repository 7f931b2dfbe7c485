//! Linear algebra kernels for weighted least squares.

pub mod lsq;

pub use lsq::*;
