//! # Fiinny Common Library
//!
//! Shared code for the Fiinny backend services including:
//! - Error types
//! - Configuration loading (TOML file, environment overrides)
//! - Logging bootstrap
//! - Deterministic record identifiers shared with job producers
//! - Timestamp helpers

pub mod config;
pub mod doc_id;
pub mod error;
pub mod logging;
pub mod time;

pub use doc_id::record_id_from_tx_key;
pub use error::{Error, Result};
