//! HTTP transport for the tana dashboard API.
//!
//! One [`ApiClient`] per session: it owns the bearer token, decodes the
//! `{ success, data | error }` response envelope, and intercepts 401s
//! globally so feature code never sees them.

mod client;
pub use client::ApiClient;

mod envelope;
pub use envelope::ErrorBody;

pub mod error;
pub use error::ApiError;

mod routes;
