//! Adapters for external systems: the record store, bundle sources and
//! scoring routines.

pub mod bundle;
pub mod scorers;
pub mod sqlite;
