use crate::engine::DeltaRateEngine;
use crate::source::CounterSource;
use crate::Collector;
use hostmon_common::error::Result;
use hostmon_common::types::{EntityId, EntityKind, RateRecord};
use serde::Serialize;
use serde_json::json;

/// One interface in the `nets` family.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetReport {
    pub name: String,
    #[serde(flatten)]
    pub rates: RateRecord,
    /// 1 when the link carrier is up, 0 otherwise.
    #[serde(rename = "intfState")]
    pub intf_state: u8,
    /// Link speed is not read and always serializes as `null`.
    pub bandwidth: Option<u64>,
}

/// Byte, packet and error rates of every network interface.
#[derive(Debug)]
pub struct NetworkCollector {
    interval_secs: f64,
}

impl NetworkCollector {
    pub fn new(interval_secs: f64) -> Self {
        Self { interval_secs }
    }
}

impl Collector for NetworkCollector {
    fn name(&self) -> &str {
        "nets"
    }

    fn collect(
        &mut self,
        engine: &mut DeltaRateEngine,
        source: &dyn CounterSource,
    ) -> Result<Option<serde_json::Value>> {
        let samples = source.read_nets()?;
        let current: Vec<EntityId> = samples
            .iter()
            .map(|s| EntityId::interface(&s.name))
            .collect();
        let outcome = engine.reconcile(EntityKind::NetworkInterface, &current, |_| true);
        if !outcome.newly_seen.is_empty() {
            let names: Vec<String> = outcome.newly_seen.iter().map(EntityId::key).collect();
            tracing::debug!(interfaces = ?names, "New network interfaces");
        }

        let mut nets = Vec::with_capacity(samples.len());
        for (sample, id) in samples.into_iter().zip(&current) {
            if let Some(rates) = engine.observe(id, sample.counters, self.interval_secs) {
                nets.push(NetReport {
                    name: sample.name,
                    rates,
                    intf_state: u8::from(sample.link_up),
                    bandwidth: None,
                });
            }
        }

        if nets.is_empty() {
            return Ok(None);
        }
        Ok(Some(json!({ "nets": nets })))
    }
}
