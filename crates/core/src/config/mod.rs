//! Configuration loading and schema definitions

mod loader;
mod schema;

pub use loader::{Config, BASE_URL_ENV};
pub use schema::*;
