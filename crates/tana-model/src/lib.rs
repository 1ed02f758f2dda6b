//! Domain types and wire payloads for the tana dashboard client.
//!
//! Everything here mirrors the JSON shapes of the REST API: camelCase field
//! names, RFC 3339 timestamps, snake_case enum values where the server uses
//! them.

mod domain;
pub use domain::*;
