//! # AutoEye Shared Rust Library
//!
//! Shared infrastructure for the AutoEye edge node components:
//! - **error**: Common error type for startup and configuration paths
//! - **tracing**: Logging setup with AutoEye segment prefixes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use autoeye::error::Error;
//! use autoeye::tracing::prefix;
//!
//! autoeye::tracing::init_with_filter("debug");
//! ```

pub mod error;
pub mod tracing;

pub use error::{Error, Result};
