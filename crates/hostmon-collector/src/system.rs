use crate::engine::DeltaRateEngine;
use crate::source::CounterSource;
use crate::Collector;
use hostmon_common::error::Result;
use serde_json::json;

/// Host uptime and agent state.
#[derive(Debug, Default)]
pub struct SystemCollector;

impl SystemCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for SystemCollector {
    fn name(&self) -> &str {
        "system"
    }

    fn collect(
        &mut self,
        _engine: &mut DeltaRateEngine,
        source: &dyn CounterSource,
    ) -> Result<Option<serde_json::Value>> {
        let uptime = source.read_uptime()?;
        Ok(Some(json!({ "uptime": uptime, "state": "running" })))
    }
}
