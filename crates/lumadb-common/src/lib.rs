//! LumaDB Common - Shared utilities and types
//!
//! This crate provides the ambient functionality used by the NoSQL query bridge:
//! - Error types and handling
//! - Configuration management
//! - Tracing initialization
//! - Metrics and observability

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{
    AutoFields, Config, EntitySettings, LoggingConfig, QueryConfig, StoreSettings, WritePolicy,
};
pub use error::{Error, Result};
