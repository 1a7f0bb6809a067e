use crate::engine::DeltaRateEngine;
use crate::source::CounterSource;
use crate::Collector;
use hostmon_common::error::Result;
use hostmon_common::types::{EntityId, EntityKind, RateRecord};
use serde::Serialize;
use serde_json::json;

/// One mounted block device in the `disks` family.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskReport {
    pub name: String,
    #[serde(flatten)]
    pub rates: RateRecord,
    /// Filesystem size in MB.
    pub capacity: u64,
    /// Used space in percent.
    pub usage: u64,
}

/// Throughput, IOPS and latency of every mounted block device.
#[derive(Debug)]
pub struct DiskCollector {
    interval_secs: f64,
}

impl DiskCollector {
    pub fn new(interval_secs: f64) -> Self {
        Self { interval_secs }
    }
}

impl Collector for DiskCollector {
    fn name(&self) -> &str {
        "disks"
    }

    fn collect(
        &mut self,
        engine: &mut DeltaRateEngine,
        source: &dyn CounterSource,
    ) -> Result<Option<serde_json::Value>> {
        let samples = source.read_disks()?;
        let current: Vec<EntityId> = samples.iter().map(|s| EntityId::disk(&s.name)).collect();
        let outcome = engine.reconcile(EntityKind::DiskDevice, &current, |_| true);
        for id in &outcome.vanished {
            tracing::info!(disk = %id.key(), "Disk no longer mounted");
        }

        let mut disks = Vec::with_capacity(samples.len());
        for (sample, id) in samples.into_iter().zip(&current) {
            if let Some(rates) = engine.observe(id, sample.counters, self.interval_secs) {
                disks.push(DiskReport {
                    name: sample.name,
                    rates,
                    capacity: sample.capacity_mb,
                    usage: sample.usage_percent,
                });
            }
        }

        if disks.is_empty() {
            return Ok(None);
        }
        Ok(Some(json!({ "count": disks.len(), "disks": disks })))
    }
}
