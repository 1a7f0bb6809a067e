use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The closed set of things the agent keeps counter history for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    SystemCpuCore,
    ProcessCpu,
    DiskDevice,
    NetworkInterface,
}

impl EntityKind {
    /// Number of counter fields a sample of this kind carries.
    ///
    /// ```
    /// use hostmon_common::types::EntityKind;
    ///
    /// assert_eq!(EntityKind::SystemCpuCore.field_count(), 8);
    /// assert_eq!(EntityKind::NetworkInterface.field_count(), 16);
    /// ```
    pub fn field_count(self) -> usize {
        match self {
            EntityKind::SystemCpuCore => 8,
            EntityKind::ProcessCpu => 4,
            EntityKind::DiskDevice => 11,
            EntityKind::NetworkInterface => 16,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::SystemCpuCore => write!(f, "cpu core"),
            EntityKind::ProcessCpu => write!(f, "process"),
            EntityKind::DiskDevice => write!(f, "disk"),
            EntityKind::NetworkInterface => write!(f, "interface"),
        }
    }
}

/// Identity of a tracked entity.
///
/// Processes are scoped by the group that monitors them, so the same PID
/// watched by two groups keeps two independent baselines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    CpuCore(String),
    Process { group: String, pid: u32 },
    Disk(String),
    Interface(String),
}

impl EntityId {
    pub fn core(label: impl Into<String>) -> Self {
        EntityId::CpuCore(label.into())
    }

    pub fn process(group: impl Into<String>, pid: u32) -> Self {
        EntityId::Process {
            group: group.into(),
            pid,
        }
    }

    pub fn disk(name: impl Into<String>) -> Self {
        EntityId::Disk(name.into())
    }

    pub fn interface(name: impl Into<String>) -> Self {
        EntityId::Interface(name.into())
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityId::CpuCore(_) => EntityKind::SystemCpuCore,
            EntityId::Process { .. } => EntityKind::ProcessCpu,
            EntityId::Disk(_) => EntityKind::DiskDevice,
            EntityId::Interface(_) => EntityKind::NetworkInterface,
        }
    }

    /// The key within the kind: core label, PID, device or interface name.
    pub fn key(&self) -> String {
        match self {
            EntityId::CpuCore(label) => label.clone(),
            EntityId::Process { pid, .. } => pid.to_string(),
            EntityId::Disk(name) | EntityId::Interface(name) => name.clone(),
        }
    }

    /// True when this is a process watched by `name`.
    pub fn in_group(&self, name: &str) -> bool {
        matches!(self, EntityId::Process { group, .. } if group == name)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Process { group, pid } => write!(f, "{group}/{pid}"),
            other => write!(f, "{} {}", other.kind(), other.key()),
        }
    }
}

/// Cumulative counters read from one source line at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterVector(Vec<u64>);

impl CounterVector {
    pub fn new(values: Vec<u64>) -> Self {
        Self(values)
    }

    /// Builds a vector of exactly `kind.field_count()` fields. Missing
    /// trailing fields become zero and extra ones are dropped.
    ///
    /// ```
    /// use hostmon_common::types::{CounterVector, EntityKind};
    ///
    /// let v = CounterVector::padded(EntityKind::SystemCpuCore, vec![1, 2, 3, 4]);
    /// assert_eq!(v.as_slice(), &[1, 2, 3, 4, 0, 0, 0, 0]);
    /// ```
    pub fn padded(kind: EntityKind, mut values: Vec<u64>) -> Self {
        values.resize(kind.field_count(), 0);
        Self(values)
    }

    pub fn into_padded(self, kind: EntityKind) -> Self {
        Self::padded(kind, self.0)
    }

    pub fn get(&self, index: usize) -> u64 {
        self.0.get(index).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    /// Field-wise `self - baseline`. A field that went backwards (counter
    /// reset or PID reuse) contributes zero instead of wrapping.
    pub fn delta_since(&self, baseline: &CounterVector) -> CounterVector {
        let len = self.0.len().max(baseline.0.len());
        CounterVector(
            (0..len)
                .map(|i| self.get(i).saturating_sub(baseline.get(i)))
                .collect(),
        )
    }
}

impl From<Vec<u64>> for CounterVector {
    fn from(values: Vec<u64>) -> Self {
        Self(values)
    }
}

/// Derived per-poll values keyed by metric label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateRecord(BTreeMap<String, f64>);

impl RateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, value: f64) {
        self.0.insert(label.into(), value);
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.get(label).copied()
    }

    /// Value for `label`, zero when absent.
    pub fn value(&self, label: &str) -> f64 {
        self.get(label).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// Adds every value of `other` into the matching label of `self`.
    pub fn accumulate(&mut self, other: &RateRecord) {
        for (label, value) in other.iter() {
            *self.0.entry(label.to_string()).or_insert(0.0) += value;
        }
    }
}

impl<const N: usize> From<[(&str, f64); N]> for RateRecord {
    fn from(pairs: [(&str, f64); N]) -> Self {
        Self(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }
}

/// Rounds to two decimal places, the precision of every emitted value.
///
/// ```
/// use hostmon_common::types::round2;
///
/// assert_eq!(round2(16.666_666), 16.67);
/// assert_eq!(round2(-0.004), 0.0);
/// ```
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // avoid emitting -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

type RawSnapshot = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// One poll's worth of output.
///
/// Serialized as a single-key object whose key is the Unix timestamp in
/// fractional seconds:
///
/// ```
/// use hostmon_common::types::Snapshot;
///
/// let mut snap = Snapshot::at(1_700_000_000.5);
/// snap.insert("system", serde_json::json!({"uptime": 12.0, "state": "running"}));
/// let text = serde_json::to_string(&snap).unwrap();
/// assert!(text.starts_with("{\"1700000000.5\":"));
///
/// let back: Snapshot = serde_json::from_str(&text).unwrap();
/// assert_eq!(back.timestamp, 1_700_000_000.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSnapshot", into = "RawSnapshot")]
pub struct Snapshot {
    pub timestamp: f64,
    pub families: BTreeMap<String, serde_json::Value>,
}

impl Snapshot {
    pub fn at(timestamp: f64) -> Self {
        Self {
            timestamp,
            families: BTreeMap::new(),
        }
    }

    pub fn new(now: DateTime<Utc>) -> Self {
        Self::at(now.timestamp_micros() as f64 / 1_000_000.0)
    }

    pub fn insert(&mut self, family: impl Into<String>, body: serde_json::Value) {
        self.families.insert(family.into(), body);
    }

    pub fn family(&self, name: &str) -> Option<&serde_json::Value> {
        self.families.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

impl TryFrom<RawSnapshot> for Snapshot {
    type Error = String;

    fn try_from(raw: RawSnapshot) -> Result<Self, Self::Error> {
        let mut entries = raw.into_iter();
        let (key, families) = entries
            .next()
            .ok_or_else(|| "snapshot has no timestamp key".to_string())?;
        if entries.next().is_some() {
            return Err("snapshot has more than one timestamp key".to_string());
        }
        let timestamp = key
            .parse::<f64>()
            .map_err(|e| format!("invalid snapshot timestamp '{key}': {e}"))?;
        Ok(Self {
            timestamp,
            families,
        })
    }
}

impl From<Snapshot> for RawSnapshot {
    fn from(snapshot: Snapshot) -> Self {
        let mut raw = RawSnapshot::new();
        raw.insert(snapshot.timestamp.to_string(), snapshot.families);
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_clamps_negative_fields() {
        let before = CounterVector::new(vec![10, 20, 30]);
        let after = CounterVector::new(vec![15, 5, 30]);
        assert_eq!(after.delta_since(&before).as_slice(), &[5, 0, 0]);
    }

    #[test]
    fn delta_handles_shape_mismatch() {
        let before = CounterVector::new(vec![1, 1]);
        let after = CounterVector::new(vec![3, 3, 3]);
        assert_eq!(after.delta_since(&before).as_slice(), &[2, 2, 3]);
    }

    #[test]
    fn padded_truncates_long_lines() {
        let v = CounterVector::padded(EntityKind::ProcessCpu, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(v.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn process_ids_are_scoped_by_group() {
        let a = EntityId::process("qemu", 42);
        let b = EntityId::process("vhost", 42);
        assert_ne!(a, b);
        assert_eq!(a.key(), "42");
        assert_eq!(a.kind(), EntityKind::ProcessCpu);
        assert!(a.in_group("qemu"));
        assert!(!a.in_group("vhost"));
        assert_eq!(a.to_string(), "qemu/42");
    }

    #[test]
    fn rate_record_accumulates() {
        let mut total = RateRecord::new();
        total.accumulate(&RateRecord::from([("user", 1.5), ("system", 0.5)]));
        total.accumulate(&RateRecord::from([("user", 2.0)]));
        assert_eq!(total.value("user"), 3.5);
        assert_eq!(total.value("system"), 0.5);
        assert_eq!(total.value("idle"), 0.0);
    }

    #[test]
    fn snapshot_rejects_bad_timestamp() {
        let err = serde_json::from_str::<Snapshot>(r#"{"yesterday": {}}"#).unwrap_err();
        assert!(err.to_string().contains("invalid snapshot timestamp"));
    }

    #[test]
    fn snapshot_from_datetime_keeps_microseconds() {
        let now = DateTime::from_timestamp(1_700_000_000, 250_000_000).unwrap();
        assert_eq!(Snapshot::new(now).timestamp, 1_700_000_000.25);
    }
}
