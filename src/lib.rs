//! Curio Cards supply service.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod feed;
pub mod balance;
pub mod engine;
pub mod storage;
pub mod api;
