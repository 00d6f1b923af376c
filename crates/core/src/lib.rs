//! Core utilities for QRShare
//!
//! This crate provides shared functionality used by every other crate in the
//! workspace:
//!
//! - **Error handling**: coded errors with context and recovery suggestions
//! - **Configuration**: TOML-based configuration with defaults and validation
//! - **Validation**: upload preconditions and client filename sanitization
//!
//! # Example
//!
//! ```rust,no_run
//! use qrshare_core::config::Config;
//!
//! let config = Config::load(None).expect("invalid configuration");
//! println!("serving links under {}", config.schema.server.base_url);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod validation;

pub use error::{Error, ErrorCode, ErrorReport, Result, ResultExt};

