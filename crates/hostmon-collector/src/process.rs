//! CPU use of individual processes and process groups.
//!
//! Every group reconciles its PID list against what it tracked on the
//! previous poll: PIDs that disappeared lose their baseline, new ones get a
//! baseline and report from the next poll on.

use crate::discovery::ProcessFinder;
use crate::engine::DeltaRateEngine;
use crate::source::CounterSource;
use crate::Collector;
use hostmon_common::error::Result;
use hostmon_common::types::{round2, EntityId, EntityKind, RateRecord};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const QEMU_PATTERN: &str = "qemu-system";
pub const KSOFTIRQD_PATTERN: &str = "ksoftirqd";
pub const VHOST_PATTERN: &str = "vhost";

/// Outcome of sampling one process group for one poll.
#[derive(Debug, Default, PartialEq)]
pub struct GroupSample {
    /// Rates of PIDs that already had a baseline.
    pub rates: BTreeMap<u32, RateRecord>,
    /// PIDs whose first sample was taken this poll.
    pub started: Vec<u32>,
    /// PIDs that were listed but gone by the time they were read.
    pub vanished: Vec<u32>,
}

/// Samples `pids` as members of `group` and returns the rate of every PID
/// that was already tracked.
///
/// A PID is announced as monitored only once its first read succeeds, so a
/// configured PID that no longer exists stays quiet.
pub fn sample_group(
    engine: &mut DeltaRateEngine,
    source: &dyn CounterSource,
    group: &str,
    pids: &[u32],
) -> GroupSample {
    let current: Vec<EntityId> = pids.iter().map(|pid| EntityId::process(group, *pid)).collect();
    let outcome = engine.reconcile(EntityKind::ProcessCpu, &current, |id| id.in_group(group));

    let mut sample = GroupSample::default();
    for (pid, id) in pids.iter().zip(&current) {
        match source.read_process_cpu(*pid) {
            Ok(counters) => match engine.observe(id, counters, 1.0) {
                Some(rate) => {
                    sample.rates.insert(*pid, rate);
                }
                None if outcome.newly_seen.contains(id) => sample.started.push(*pid),
                None => {}
            },
            Err(e) if e.is_vanished() => {
                engine.forget(id);
                sample.vanished.push(*pid);
            }
            Err(e) => tracing::warn!(group, pid, error = %e, "Failed to sample process"),
        }
    }

    if !sample.started.is_empty() {
        tracing::info!(group, pids = ?sample.started, "Monitoring new processes");
    }
    if !sample.vanished.is_empty() {
        tracing::debug!(group, pids = ?sample.vanished, "Processes exited before sampling");
    }
    sample
}

/// Sum of the per-PID records. Each PID is normalized on its own first.
pub fn group_total(rates: &BTreeMap<u32, RateRecord>) -> RateRecord {
    let mut sum = RateRecord::from([("user", 0.0), ("system", 0.0)]);
    for rate in rates.values() {
        sum.accumulate(rate);
    }
    rounded(&sum)
}

fn rounded(record: &RateRecord) -> RateRecord {
    let mut out = RateRecord::new();
    for (label, value) in record.iter() {
        out.insert(label, round2(value));
    }
    out
}

/// CPU use of the configured data-plane process, reported as `dp-cpu`.
#[derive(Debug)]
pub struct DpCpuCollector {
    pid: u32,
}

impl DpCpuCollector {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }
}

impl Collector for DpCpuCollector {
    fn name(&self) -> &str {
        "dp-cpu"
    }

    fn collect(
        &mut self,
        engine: &mut DeltaRateEngine,
        source: &dyn CounterSource,
    ) -> Result<Option<Value>> {
        let mut sample = sample_group(engine, source, "dp", &[self.pid]);
        Ok(sample
            .rates
            .remove(&self.pid)
            .map(|rate| json!({ "dp_process_cpu": rate })))
    }
}

/// Per-VM CPU use of every `qemu-system` process, keyed `qemu_<pid>`.
pub struct QemuCpuCollector {
    finder: Box<dyn ProcessFinder>,
}

impl QemuCpuCollector {
    pub fn new(finder: Box<dyn ProcessFinder>) -> Self {
        Self { finder }
    }
}

impl Collector for QemuCpuCollector {
    fn name(&self) -> &str {
        "qemu-cpu"
    }

    fn collect(
        &mut self,
        engine: &mut DeltaRateEngine,
        source: &dyn CounterSource,
    ) -> Result<Option<Value>> {
        let pids = self.finder.find(QEMU_PATTERN);
        let rates = sample_group(engine, source, "qemu", &pids).rates;
        if rates.is_empty() {
            return Ok(None);
        }
        let mut body = Map::new();
        for (pid, rate) in rates {
            body.insert(format!("qemu_{pid}"), serde_json::to_value(rate)?);
        }
        Ok(Some(Value::Object(body)))
    }
}

/// Kernel-side cost of Open vSwitch datapath traffic: softirq threads and
/// vhost workers, each summed over its group, plus the total as `ovs-kernel`.
pub struct OvsKernelCpuCollector {
    finder: Box<dyn ProcessFinder>,
}

impl OvsKernelCpuCollector {
    pub fn new(finder: Box<dyn ProcessFinder>) -> Self {
        Self { finder }
    }
}

impl Collector for OvsKernelCpuCollector {
    fn name(&self) -> &str {
        "ovs-kernel-cpu"
    }

    fn collect(
        &mut self,
        engine: &mut DeltaRateEngine,
        source: &dyn CounterSource,
    ) -> Result<Option<Value>> {
        let mut body = Map::new();
        let mut overall = RateRecord::from([("user", 0.0), ("system", 0.0)]);

        for (group, pattern) in [("ksoftirqd", KSOFTIRQD_PATTERN), ("vhost", VHOST_PATTERN)] {
            let pids = self.finder.find(pattern);
            let rates = sample_group(engine, source, group, &pids).rates;
            if rates.is_empty() {
                continue;
            }
            let total = group_total(&rates);
            overall.accumulate(&total);
            body.insert(group.to_string(), serde_json::to_value(total)?);
        }

        body.insert("ovs-kernel".to_string(), serde_json::to_value(rounded(&overall))?);
        Ok(Some(Value::Object(body)))
    }
}
