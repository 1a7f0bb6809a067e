use crate::error::{ReportError, Result};
use crate::stats::Summary;
use crate::window::TimeWindow;
use hostmon_common::config::{AgentConfig, ReportConfig};
use hostmon_common::types::Snapshot;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Per key (`cpu`, `cpu3`, `dp_process_cpu`, `qemu_<pid>`, ...), the summary
/// of every kept field.
pub type CpuStat = BTreeMap<String, BTreeMap<String, Summary>>;

/// The report printed by `hostmon-report`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuReport {
    #[serde(rename = "CPU_STAT")]
    pub cpu_stat: CpuStat,
}

/// Families whose series are gathered, as enabled in the agent config.
/// `cpu` is always included.
pub fn sources_for(config: &AgentConfig) -> Vec<&'static str> {
    let mut sources = vec!["cpu"];
    if config.dp_pid.is_some() {
        sources.push("dp-cpu");
    }
    if config.monitor_qemu {
        sources.push("qemu-cpu");
    }
    if config.monitor_ovs_kernel {
        sources.push("ovs-kernel-cpu");
    }
    sources
}

/// Opens the snapshot stream written by the agent.
pub fn open_stream(path: impl AsRef<Path>) -> Result<BufReader<File>> {
    let path = path.as_ref();
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ReportError::Read {
            path: path.display().to_string(),
            source,
        })
}

/// Parses a concatenated sequence of snapshot objects, whitespace between
/// them ignored.
///
/// The agent may be stopped halfway through a record, so a stream that
/// ends inside an object ends the iteration with a warning. Any other
/// malformed record is an error.
pub fn read_snapshots<R: Read>(reader: R) -> impl Iterator<Item = Result<Snapshot>> {
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<Snapshot>()
        .enumerate()
        .map_while(|(parsed, item)| match item {
            Ok(snapshot) => Some(Ok(snapshot)),
            Err(source) if source.is_eof() => {
                tracing::warn!(parsed, error = %source, "Ignoring incomplete last snapshot");
                None
            }
            Err(source) => Some(Err(ReportError::Parse { parsed, source })),
        })
}

/// True for per-core keys such as `cpu0` or `cpu12`, not the aggregate `cpu`.
pub fn is_core_key(key: &str) -> bool {
    key.strip_prefix("cpu")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_digit())
}

/// Collects the series of the selected families across a snapshot stream.
#[derive(Debug)]
pub struct Aggregator {
    window: TimeWindow,
    sources: Vec<String>,
    series: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    accepted: usize,
}

impl Aggregator {
    pub fn new<S: Into<String>>(window: TimeWindow, sources: impl IntoIterator<Item = S>) -> Self {
        Self {
            window,
            sources: sources.into_iter().map(Into::into).collect(),
            series: BTreeMap::new(),
            accepted: 0,
        }
    }

    /// Snapshots inside the window that carried a `cpu` family.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Adds one snapshot. Returns false when it falls outside the window.
    pub fn feed(&mut self, snapshot: &Snapshot) -> bool {
        if !self.window.contains(snapshot.timestamp) {
            return false;
        }
        if snapshot.family("cpu").is_some() {
            self.accepted += 1;
        }

        for family in &self.sources {
            let Some(body) = snapshot.family(family).and_then(|v| v.as_object()) else {
                continue;
            };
            for (key, fields) in body {
                let Some(fields) = fields.as_object() else {
                    tracing::debug!(family = %family, key = %key, "Skipping non-object entry");
                    continue;
                };
                let entry = self.series.entry(key.clone()).or_default();
                for (field, value) in fields {
                    if let Some(value) = value.as_f64() {
                        entry.entry(field.clone()).or_default().push(value);
                    }
                }
            }
        }
        true
    }

    /// Feeds every snapshot of a stream and returns how many were inside
    /// the window.
    pub fn consume<R: Read>(&mut self, reader: R) -> Result<usize> {
        let mut kept = 0;
        for snapshot in read_snapshots(reader) {
            if self.feed(&snapshot?) {
                kept += 1;
            }
        }
        Ok(kept)
    }

    /// Reduces the gathered series.
    ///
    /// Per-core keys are left out unless `show_cpu_details` is set, and
    /// then also when their mean idle exceeds `mute_idlecpu`. Only fields
    /// listed in `cpu_fields` are summarized.
    pub fn finish(&self, config: &ReportConfig) -> CpuReport {
        let mut cpu_stat = CpuStat::new();
        for (key, fields) in &self.series {
            if is_core_key(key) {
                if !config.show_cpu_details {
                    continue;
                }
                let idle_mean = fields
                    .get("idle")
                    .and_then(|idle| Summary::of(idle))
                    .map(|s| s.mean);
                if idle_mean.is_some_and(|mean| mean > config.mute_idlecpu) {
                    continue;
                }
            }

            let summaries: BTreeMap<String, Summary> = fields
                .iter()
                .filter(|(field, _)| config.cpu_fields.iter().any(|f| f == *field))
                .filter_map(|(field, values)| Some((field.clone(), Summary::of(values)?)))
                .collect();
            cpu_stat.insert(key.clone(), summaries);
        }
        CpuReport { cpu_stat }
    }
}
