use crate::engine::DeltaRateEngine;
use crate::procfs::MemInfo;
use crate::source::CounterSource;
use crate::Collector;
use hostmon_common::error::Result;
use hostmon_common::types::round2;
use serde::Serialize;

/// The `mem` family. Sizes are in kB as `/proc/meminfo` reports them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryReport {
    pub total: u64,
    pub used: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub caches: u64,
    pub buffers: u64,
    pub active: u64,
    /// Used memory excluding page cache and buffers, in percent.
    pub usage: f64,
}

impl From<&MemInfo> for MemoryReport {
    fn from(info: &MemInfo) -> Self {
        let used = info.total.saturating_sub(info.free);
        let usage = if info.total == 0 {
            0.0
        } else {
            let app = used.saturating_sub(info.cached).saturating_sub(info.buffers);
            round2(app as f64 / info.total as f64 * 100.0)
        };
        Self {
            total: info.total,
            used,
            swap_total: info.swap_total,
            swap_free: info.swap_free,
            caches: info.cached,
            buffers: info.buffers,
            active: info.active,
            usage,
        }
    }
}

/// Memory gauges. Reports on every poll, including the first.
#[derive(Debug, Default)]
pub struct MemoryCollector;

impl MemoryCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "mem"
    }

    fn collect(
        &mut self,
        _engine: &mut DeltaRateEngine,
        source: &dyn CounterSource,
    ) -> Result<Option<serde_json::Value>> {
        let info = source.read_memory()?;
        Ok(Some(serde_json::to_value(MemoryReport::from(&info))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_excludes_cache_and_buffers() {
        let info = MemInfo {
            total: 1000,
            free: 200,
            swap_total: 50,
            swap_free: 40,
            cached: 300,
            buffers: 100,
            active: 400,
        };
        let report = MemoryReport::from(&info);
        assert_eq!(report.used, 800);
        assert_eq!(report.usage, 40.0);
        assert_eq!(report.caches, 300);
    }

    #[test]
    fn zero_total_reports_zero_usage() {
        let report = MemoryReport::from(&MemInfo::default());
        assert_eq!(report.usage, 0.0);
    }

    #[test]
    fn serializes_camel_case_keys() {
        let value = serde_json::to_value(MemoryReport::from(&MemInfo::default())).unwrap();
        assert!(value.get("swapTotal").is_some());
        assert!(value.get("swapFree").is_some());
    }
}
