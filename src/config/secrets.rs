//! Secret handling utilities.
//!
//! Re-exports the secrecy types the binary needs to hand the database URL
//! to the pool without it ever reaching a log line.

pub use secrecy::{ExposeSecret, SecretString};
