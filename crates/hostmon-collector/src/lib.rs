//! Metric collection for the hostmon agent.
//!
//! Each [`Collector`] produces one family of a snapshot (`cpu`, `mem`,
//! `disks`, ...). Collectors that report rates share one
//! [`engine::DeltaRateEngine`], which remembers the previous counters of
//! every tracked entity, and read raw counters through a
//! [`source::CounterSource`].

pub mod cpu;
pub mod discovery;
pub mod disk;
pub mod engine;
pub mod memory;
pub mod network;
pub mod process;
pub mod procfs;
pub mod source;
pub mod store;
pub mod system;


use engine::DeltaRateEngine;
use hostmon_common::error::Result;
use source::CounterSource;

/// Produces one snapshot family per poll.
///
/// Collectors are called in registration order, once per poll, from the
/// agent's single polling task. `cpu` must come before the process
/// collectors because it refreshes the tick basis they normalize against.
pub trait Collector: Send {
    /// The family key in the snapshot (e.g., `"cpu"`, `"disks"`).
    fn name(&self) -> &str;

    /// Samples the family.
    ///
    /// Returns `Ok(None)` when nothing can be reported yet, typically the
    /// first poll, where only baselines are recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying counter source cannot be read.
    fn collect(
        &mut self,
        engine: &mut DeltaRateEngine,
        source: &dyn CounterSource,
    ) -> Result<Option<serde_json::Value>>;
}
