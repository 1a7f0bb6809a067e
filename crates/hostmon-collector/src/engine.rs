//! Stateful conversion of counter snapshots into rates.
//!
//! [`DeltaRateEngine`] owns the [`EntityCounterStore`] and applies the
//! kind-specific formula to each delta. CPU cores are special: the mean
//! per-core tick delta of a poll becomes the basis that process CPU rates
//! are normalized against, so system CPU must be sampled before processes
//! within a poll.

use crate::store::EntityCounterStore;
use hostmon_common::types::{round2, CounterVector, EntityId, EntityKind, RateRecord};
use std::collections::{BTreeMap, HashSet};

/// Bytes per sector as reported by `/proc/diskstats`, independent of the
/// device's physical sector size.
pub const SECTOR_SIZE: u64 = 512;

/// Tick basis used before the first CPU delta exists: one second of USER_HZ.
pub const DEFAULT_ELAPSED_TICKS: f64 = 100.0;

/// Label of the all-cores line in `/proc/stat`.
pub const AGGREGATE_CPU: &str = "cpu";

/// CPU category labels in `/proc/stat` column order.
pub const CPU_CATEGORIES: [&str; 8] = [
    "user", "nice", "system", "idle", "iowait", "hardirq", "softirq", "steal",
];

mod proc_field {
    pub const UTIME: usize = 0;
    pub const STIME: usize = 1;
    pub const CUTIME: usize = 2;
    pub const CSTIME: usize = 3;
}

mod disk_field {
    pub const READS: usize = 0;
    pub const SECTORS_READ: usize = 2;
    pub const READ_MS: usize = 3;
    pub const WRITES: usize = 4;
    pub const SECTORS_WRITTEN: usize = 6;
    pub const WRITE_MS: usize = 7;
}

mod net_field {
    pub const RX_BYTES: usize = 0;
    pub const RX_PACKETS: usize = 1;
    pub const RX_ERRS: usize = 2;
    pub const RX_MULTICAST: usize = 7;
    pub const TX_BYTES: usize = 8;
    pub const TX_PACKETS: usize = 9;
    pub const TX_ERRS: usize = 10;
}

/// `100 * num / total` rounded to two decimals, zero when `total` is zero.
///
/// ```
/// use hostmon_collector::engine::percent;
///
/// assert_eq!(percent(10.0, 60.0), 16.67);
/// assert_eq!(percent(5.0, 0.0), 0.0);
/// ```
pub fn percent(num: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    round2(num / total * 100.0)
}

/// Category percentages of a CPU tick delta, plus the delta's total.
pub fn cpu_rates(delta: &CounterVector) -> (RateRecord, u64) {
    let total = delta.as_slice().iter().take(CPU_CATEGORIES.len()).sum::<u64>();
    let mut record = RateRecord::new();
    for (i, label) in CPU_CATEGORIES.iter().enumerate() {
        record.insert(*label, percent(delta.get(i) as f64, total as f64));
    }
    (record, total)
}

/// User and system share of a process tick delta against `elapsed_ticks`.
/// Reaped children's time (`cutime`, `cstime`) counts toward the parent.
pub fn process_rates(delta: &CounterVector, elapsed_ticks: f64) -> RateRecord {
    let user = delta.get(proc_field::UTIME) + delta.get(proc_field::CUTIME);
    let system = delta.get(proc_field::STIME) + delta.get(proc_field::CSTIME);
    RateRecord::from([
        ("user", percent(user as f64, elapsed_ticks)),
        ("system", percent(system as f64, elapsed_ticks)),
    ])
}

fn per_second(value: u64, interval_secs: f64) -> f64 {
    round2(value as f64 / interval_secs)
}

fn effective_interval(interval_secs: f64) -> f64 {
    if interval_secs > 0.0 {
        interval_secs
    } else {
        1.0
    }
}

/// Throughput, IOPS and latency of a `/proc/diskstats` delta.
pub fn disk_rates(delta: &CounterVector, interval_secs: f64) -> RateRecord {
    let dt = effective_interval(interval_secs);
    let read_ios = per_second(delta.get(disk_field::READS), dt);
    let write_ios = per_second(delta.get(disk_field::WRITES), dt);
    let read_latency = per_second(delta.get(disk_field::READ_MS), dt);
    let write_latency = per_second(delta.get(disk_field::WRITE_MS), dt);
    RateRecord::from([
        (
            "readTput",
            per_second(delta.get(disk_field::SECTORS_READ) * SECTOR_SIZE, dt),
        ),
        (
            "writeTput",
            per_second(delta.get(disk_field::SECTORS_WRITTEN) * SECTOR_SIZE, dt),
        ),
        ("readIos", read_ios),
        ("writeIos", write_ios),
        ("iops", round2(read_ios + write_ios)),
        ("readLatency", read_latency),
        ("writeLatency", write_latency),
        ("ioLatency", round2(read_latency + write_latency)),
    ])
}

/// Byte, packet and error rates of a `/proc/net/dev` delta.
pub fn net_rates(delta: &CounterVector, interval_secs: f64) -> RateRecord {
    let dt = effective_interval(interval_secs);
    let rx_bytes = delta.get(net_field::RX_BYTES);
    let tx_bytes = delta.get(net_field::TX_BYTES);
    let rx_packets = delta.get(net_field::RX_PACKETS);
    let tx_packets = delta.get(net_field::TX_PACKETS);
    RateRecord::from([
        ("inOctets", per_second(rx_bytes, dt)),
        ("outOctets", per_second(tx_bytes, dt)),
        ("tput", per_second(rx_bytes + tx_bytes, dt)),
        ("pktInRate", per_second(rx_packets, dt)),
        ("pktOutRate", per_second(tx_packets, dt)),
        (
            "pktRate",
            per_second(
                rx_packets + delta.get(net_field::RX_MULTICAST) + tx_packets,
                dt,
            ),
        ),
        (
            "intfErrs",
            per_second(
                delta.get(net_field::RX_ERRS) + delta.get(net_field::TX_ERRS),
                dt,
            ),
        ),
    ])
}

/// Outcome of diffing the currently present identities against the tracked ones.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Present now, not tracked before. Their next observation is a baseline.
    pub newly_seen: Vec<EntityId>,
    /// Tracked before, absent now. Already removed from the store.
    pub vanished: Vec<EntityId>,
}

/// Turns absolute counters into rates, one entity at a time.
#[derive(Debug)]
pub struct DeltaRateEngine {
    store: EntityCounterStore,
    elapsed_ticks: f64,
}

impl Default for DeltaRateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaRateEngine {
    pub fn new() -> Self {
        Self {
            store: EntityCounterStore::new(),
            elapsed_ticks: DEFAULT_ELAPSED_TICKS,
        }
    }

    pub fn store(&self) -> &EntityCounterStore {
        &self.store
    }

    /// Mean per-core tick delta of the most recent poll that had one.
    pub fn elapsed_ticks(&self) -> f64 {
        self.elapsed_ticks
    }

    /// Applies the formula for `kind` to an already computed delta.
    pub fn rate(&self, kind: EntityKind, delta: &CounterVector, interval_secs: f64) -> RateRecord {
        match kind {
            EntityKind::SystemCpuCore => cpu_rates(delta).0,
            EntityKind::ProcessCpu => process_rates(delta, self.elapsed_ticks),
            EntityKind::DiskDevice => disk_rates(delta, interval_secs),
            EntityKind::NetworkInterface => net_rates(delta, interval_secs),
        }
    }

    /// Records a new sample for `id` and returns its rate, or `None` when
    /// this is the first sample of the entity.
    pub fn observe(
        &mut self,
        id: &EntityId,
        counters: CounterVector,
        interval_secs: f64,
    ) -> Option<RateRecord> {
        let kind = id.kind();
        let counters = counters.into_padded(kind);
        match self.store.snapshot_and_advance(id, counters) {
            Some(delta) => Some(self.rate(kind, &delta, interval_secs)),
            None => {
                tracing::debug!(entity = %id, "First sample, baseline stored");
                None
            }
        }
    }

    /// Samples every line of `/proc/stat` and refreshes the tick basis used
    /// for process rates.
    ///
    /// Cores missing from `lines` are dropped from the store. Lines seen for
    /// the first time produce no entry in the result.
    pub fn system_cpu(&mut self, lines: Vec<(String, CounterVector)>) -> BTreeMap<String, RateRecord> {
        let current: Vec<EntityId> = lines.iter().map(|(label, _)| EntityId::core(label)).collect();
        self.reconcile(EntityKind::SystemCpuCore, &current, |_| true);

        let mut rates = BTreeMap::new();
        let mut core_count = 0u32;
        let mut core_ticks = 0u64;

        for (label, counters) in lines {
            let id = EntityId::core(&label);
            let counters = counters.into_padded(EntityKind::SystemCpuCore);
            let Some(delta) = self.store.snapshot_and_advance(&id, counters) else {
                continue;
            };
            let (record, total) = cpu_rates(&delta);
            if label != AGGREGATE_CPU {
                core_count += 1;
                core_ticks += total;
            }
            rates.insert(label, record);
        }

        if core_count > 0 {
            self.elapsed_ticks = core_ticks as f64 / f64::from(core_count);
        }

        rates
    }

    /// Removes tracked identities of `kind` that `in_scope` selects but
    /// `current` does not contain, and reports which of `current` are new.
    pub fn reconcile<F>(
        &mut self,
        kind: EntityKind,
        current: &[EntityId],
        in_scope: F,
    ) -> Reconciliation
    where
        F: Fn(&EntityId) -> bool,
    {
        let present: HashSet<&EntityId> = current.iter().collect();
        let mut vanished: Vec<EntityId> = self
            .store
            .tracked(kind)
            .filter(|id| in_scope(*id) && !present.contains(*id))
            .cloned()
            .collect();
        vanished.sort();

        for id in &vanished {
            let last_seen = self.store.observed_at(id);
            self.store.remove(id);
            tracing::debug!(entity = %id, ?last_seen, "Entity no longer present, baseline dropped");
        }

        let newly_seen = current
            .iter()
            .filter(|id| !self.store.contains(*id))
            .cloned()
            .collect();

        Reconciliation {
            newly_seen,
            vanished,
        }
    }

    /// Drops the baseline of an entity that disappeared between discovery
    /// and sampling.
    pub fn forget(&mut self, id: &EntityId) {
        if self.store.remove(id) {
            tracing::debug!(entity = %id, "Entity vanished, baseline dropped");
        }
    }
}
