//! Summary statistics over a recorded snapshot stream.
//!
//! The agent appends one snapshot per poll. This crate reads the stream
//! back, keeps the snapshots inside a [`window::TimeWindow`], gathers the
//! per-key CPU series of the selected families and reduces each series to a
//! [`stats::Summary`].

pub mod aggregate;
pub mod error;
pub mod stats;
pub mod window;

#[cfg(test)]
mod tests;
