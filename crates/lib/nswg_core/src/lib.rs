//! # nswg_core
//!
//! Session, refresh-token and access-control logic for the NSWG1 portal.

pub mod auth;
pub mod migrate;
pub mod models;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
