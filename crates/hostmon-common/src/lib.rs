//! Shared data model for the hostmon agent and report tools.
//!
//! [`types`] holds entity identities, counter vectors, rate records and the
//! timestamped [`types::Snapshot`] written to the output stream. [`config`]
//! is the TOML configuration read by both binaries.

pub mod config;
pub mod error;
pub mod types;
