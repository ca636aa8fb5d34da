//! PICKSLIP: bet slip engine for AI-generated sports picks
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod odds;
pub mod access;
pub mod slip;
pub mod remote;
pub mod storage;
pub mod api;
