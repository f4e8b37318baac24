//! # SODAV Monitor — Common Library
//!
//! Shared code for the detection pipeline core and any outer service
//! that sits beside it (HTTP API, report rendering, ...):
//! - Common error type
//! - Environment-variable configuration (§6 of the spec)
//! - Database schema bootstrap and connection pool
//! - Shared domain models (§3 of the spec)
//! - ISRC and duration helpers
//! - Station lifecycle repository (`record_check_result`)

pub mod config;
pub mod db;
pub mod error;
pub mod isrc;
pub mod models;
pub mod stations;
pub mod time;

pub use config::Config;
pub use error::{Error, Result};
