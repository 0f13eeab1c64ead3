//! # Curator Common Library
//!
//! Shared code for the Curator metadata-curation services:
//! - Error types
//! - Event types (CuratorEvent enum) and the broadcast EventBus
//! - Configuration loading and data directory resolution
//! - Settings key-value accessors
//! - SSE utilities

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
