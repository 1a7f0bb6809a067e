use chrono::{DateTime, Utc};
use hostmon_collector::cpu::CpuCollector;
use hostmon_collector::discovery::ProcfsFinder;
use hostmon_collector::disk::DiskCollector;
use hostmon_collector::engine::DeltaRateEngine;
use hostmon_collector::memory::MemoryCollector;
use hostmon_collector::network::NetworkCollector;
use hostmon_collector::process::{DpCpuCollector, OvsKernelCpuCollector, QemuCpuCollector};
use hostmon_collector::source::CounterSource;
use hostmon_collector::system::SystemCollector;
use hostmon_collector::Collector;
use hostmon_common::config::AgentConfig;
use hostmon_common::types::Snapshot;

/// Builds the collectors enabled by `config`, in poll order.
///
/// `cpu` runs before the process families so they see this poll's tick
/// basis. The process families are skipped entirely without `cpu`.
pub fn collectors_for(config: &AgentConfig) -> Vec<Box<dyn Collector>> {
    let interval = config.collection_interval_secs as f64;
    let mut collectors: Vec<Box<dyn Collector>> = Vec::new();

    if config.is_enabled("cpu") {
        collectors.push(Box::new(CpuCollector::new()));
        if let Some(pid) = config.dp_pid {
            collectors.push(Box::new(DpCpuCollector::new(pid)));
        }
        if config.monitor_qemu {
            let finder = ProcfsFinder::new(&config.proc_root);
            collectors.push(Box::new(QemuCpuCollector::new(Box::new(finder))));
        }
        if config.monitor_ovs_kernel {
            let finder = ProcfsFinder::new(&config.proc_root);
            collectors.push(Box::new(OvsKernelCpuCollector::new(Box::new(finder))));
        }
    } else if config.dp_pid.is_some() || config.monitor_qemu || config.monitor_ovs_kernel {
        tracing::warn!("Process CPU monitoring needs the cpu metric, skipping");
    }

    if config.is_enabled("mem") {
        collectors.push(Box::new(MemoryCollector::new()));
    }
    if config.is_enabled("system") {
        collectors.push(Box::new(SystemCollector::new()));
    }
    if config.is_enabled("disks") {
        collectors.push(Box::new(DiskCollector::new(interval)));
    }
    if config.is_enabled("nets") {
        collectors.push(Box::new(NetworkCollector::new(interval)));
    }
    collectors
}

/// Runs every collector once per poll and composes the results into one
/// snapshot. Owns the engine, so all counter state lives on the polling task.
pub struct SnapshotAssembler {
    collectors: Vec<Box<dyn Collector>>,
    engine: DeltaRateEngine,
    source: Box<dyn CounterSource>,
}

impl SnapshotAssembler {
    pub fn new(collectors: Vec<Box<dyn Collector>>, source: Box<dyn CounterSource>) -> Self {
        Self {
            collectors,
            engine: DeltaRateEngine::new(),
            source,
        }
    }

    pub fn families(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Samples every family. A family that fails is logged and left out;
    /// it never aborts the poll.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Snapshot {
        let mut snapshot = Snapshot::new(now);
        for collector in &mut self.collectors {
            match collector.collect(&mut self.engine, self.source.as_ref()) {
                Ok(Some(body)) => snapshot.insert(collector.name(), body),
                Ok(None) => tracing::debug!(family = collector.name(), "No record yet"),
                Err(e) => {
                    tracing::warn!(family = collector.name(), error = %e, "Collection failed")
                }
            }
        }
        tracing::debug!(
            families = snapshot.families.len(),
            tracked = self.engine.store().len(),
            "Poll complete"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostmon_collector::procfs::MemInfo;
    use hostmon_collector::source::{DiskSample, NetSample};
    use hostmon_common::error::{CollectError, Result};
    use hostmon_common::types::CounterVector;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// CPU counters advance by 100 ticks per read; disks are unreadable.
    #[derive(Default)]
    struct StepSource {
        reads: AtomicU64,
    }

    impl CounterSource for StepSource {
        fn read_system_cpu(&self) -> Result<Vec<(String, CounterVector)>> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            let counters = CounterVector::new(vec![25 * n, 0, 25 * n, 50 * n, 0, 0, 0, 0]);
            Ok(vec![("cpu".to_string(), counters.clone()), ("cpu0".to_string(), counters)])
        }

        fn read_process_cpu(&self, pid: u32) -> Result<CounterVector> {
            Err(CollectError::vanished(&hostmon_common::types::EntityId::process("dp", pid)))
        }

        fn read_disks(&self) -> Result<Vec<DiskSample>> {
            Err(CollectError::unavailable("/proc/diskstats", "no such file"))
        }

        fn read_nets(&self) -> Result<Vec<NetSample>> {
            Ok(Vec::new())
        }

        fn read_memory(&self) -> Result<MemInfo> {
            Ok(MemInfo::default())
        }

        fn read_uptime(&self) -> Result<f64> {
            Ok(10.0)
        }
    }

    fn config(metrics: &[&str]) -> AgentConfig {
        let list = metrics
            .iter()
            .map(|m| format!("\"{m}\""))
            .collect::<Vec<_>>()
            .join(", ");
        AgentConfig::parse("test.toml", &format!("metrics = [{list}]\ndp_pid = 7\n")).unwrap()
    }

    #[test]
    fn process_families_follow_cpu() {
        let cfg = config(&["mem", "cpu", "disks"]);
        let assembler = SnapshotAssembler::new(collectors_for(&cfg), Box::new(StepSource::default()));
        assert_eq!(assembler.families(), vec!["cpu", "dp-cpu", "mem", "disks"]);
    }

    #[test]
    fn process_families_need_cpu() {
        let cfg = config(&["mem", "nets"]);
        let assembler = SnapshotAssembler::new(collectors_for(&cfg), Box::new(StepSource::default()));
        assert_eq!(assembler.families(), vec!["mem", "nets"]);
    }

    #[test]
    fn failing_family_is_omitted() {
        let cfg = config(&["cpu", "mem", "system", "disks"]);
        let mut assembler =
            SnapshotAssembler::new(collectors_for(&cfg), Box::new(StepSource::default()));

        let first = assembler.poll(Utc::now());
        assert!(first.family("cpu").is_none());
        assert!(first.family("mem").is_some());
        assert!(first.family("system").is_some());
        assert!(first.family("disks").is_none());

        let second = assembler.poll(Utc::now());
        let cpu = second.family("cpu").unwrap();
        assert_eq!(cpu["cpu0"]["idle"], serde_json::json!(50.0));
        assert!(second.family("dp-cpu").is_none());
        assert!(second.family("disks").is_none());
    }
}
