//! Domain layer for the speechscore worker
//!
//! This module contains core models, errors and the port traits that
//! adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
