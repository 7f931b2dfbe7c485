//! Reporting: EOP extraction, session summaries and terminal formatting.

pub mod eop;
pub mod format;
pub mod summary;

pub use eop::*;
pub use format::*;
pub use summary::*;
