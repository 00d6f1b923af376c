//! Terminal output helpers for the QRShare command-line tools
//!
//! Provides shared CLI functionality:
//! - Status lines and coded error rendering
//! - Size and duration formatting
//! - Spinners and progress bars on stderr

#![warn(missing_docs)]

pub mod output;
pub mod progress;
