//! Refresh engine: snapshot building and refresh scheduling.

pub mod builder;
pub mod scheduler;
