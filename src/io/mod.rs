//! Input/output helpers.
//!
//! - observation CSV ingest + validation (`ingest`)
//! - session JSON read/write (`session`)
//! - result exports (JSON/CSV) (`export`)

pub mod export;
pub mod ingest;
pub mod session;

pub use export::*;
pub use ingest::*;
pub use session::*;
