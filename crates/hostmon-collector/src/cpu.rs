use crate::engine::DeltaRateEngine;
use crate::source::CounterSource;
use crate::Collector;
use hostmon_common::error::Result;

/// Per-core and aggregate CPU category percentages.
#[derive(Debug, Default)]
pub struct CpuCollector;

impl CpuCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(
        &mut self,
        engine: &mut DeltaRateEngine,
        source: &dyn CounterSource,
    ) -> Result<Option<serde_json::Value>> {
        let lines = source.read_system_cpu()?;
        let rates = engine.system_cpu(lines);
        if rates.is_empty() {
            return Ok(None);
        }
        tracing::trace!(elapsed_ticks = engine.elapsed_ticks(), "CPU tick basis updated");
        Ok(Some(serde_json::to_value(rates)?))
    }
}
