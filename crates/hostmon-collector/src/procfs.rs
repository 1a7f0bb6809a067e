//! Parsers for the text formats under `/proc`.
//!
//! Each function takes file content and returns counters; reading the files
//! is [`crate::source::ProcSource`]'s job.

use hostmon_common::error::{CollectError, Result};
use hostmon_common::types::{CounterVector, EntityKind};
use std::collections::HashMap;

/// Fields of `/proc/<pid>/stat` after the `(comm)` field that hold
/// utime, stime, cutime and cstime.
const PID_STAT_CPU_FIELDS: std::ops::Range<usize> = 11..15;

/// Memory totals from `/proc/meminfo`, in kB.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total: u64,
    pub free: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub cached: u64,
    pub buffers: u64,
    pub active: u64,
}

/// One row of `/proc/diskstats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskStatLine {
    pub major: u32,
    pub minor: u32,
    pub name: String,
    pub counters: CounterVector,
}

fn parse_u64(source_name: &str, line: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| CollectError::malformed(source_name, line))
}

/// Every `cpu*` line of `/proc/stat`, padded to the eight canonical fields.
pub fn parse_proc_stat(content: &str) -> Result<Vec<(String, CounterVector)>> {
    let mut lines = Vec::new();
    for line in content.lines().filter(|l| l.starts_with("cpu")) {
        let mut parts = line.split_whitespace();
        let Some(label) = parts.next() else {
            continue;
        };
        let values = parts
            .map(|v| parse_u64("/proc/stat", line, v))
            .collect::<Result<Vec<u64>>>()?;
        lines.push((
            label.to_string(),
            CounterVector::padded(EntityKind::SystemCpuCore, values),
        ));
    }
    Ok(lines)
}

/// `[utime, stime, cutime, cstime]` from `/proc/<pid>/stat`.
///
/// The command name may contain spaces and parentheses, so fields are
/// counted from the last `)`.
pub fn parse_pid_stat(content: &str) -> Result<CounterVector> {
    let line = content.lines().next().unwrap_or_default();
    let rest = line
        .rfind(')')
        .map(|idx| &line[idx + 1..])
        .ok_or_else(|| CollectError::malformed("/proc/<pid>/stat", line))?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let cpu = fields
        .get(PID_STAT_CPU_FIELDS)
        .ok_or_else(|| CollectError::malformed("/proc/<pid>/stat", line))?;
    let values = cpu
        .iter()
        .map(|v| parse_u64("/proc/<pid>/stat", line, v))
        .collect::<Result<Vec<u64>>>()?;
    Ok(CounterVector::new(values))
}

/// Rows of `/proc/diskstats`. Rows too short to carry the classic eleven
/// counters are skipped.
pub fn parse_diskstats(content: &str) -> Vec<DiskStatLine> {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 + EntityKind::DiskDevice.field_count() {
                return None;
            }
            let major = fields[0].parse().ok()?;
            let minor = fields[1].parse().ok()?;
            let values = fields[3..]
                .iter()
                .map(|v| v.parse::<u64>().ok())
                .collect::<Option<Vec<u64>>>()?;
            Some(DiskStatLine {
                major,
                minor,
                name: fields[2].to_string(),
                counters: CounterVector::padded(EntityKind::DiskDevice, values),
            })
        })
        .collect()
}

/// Block devices worth reporting: SCSI/IDE/virtio/Xen disks, cciss,
/// PowerPath, device-mapper, Veritas volumes and NVMe namespaces.
pub fn is_tracked_disk(name: &str) -> bool {
    let name = name.strip_prefix('x').unwrap_or(name);
    ["sd", "hd", "vd", "cciss/", "emcpower", "dm-", "VxVM", "nvme"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Per-interface counters from `/proc/net/dev`, skipping the two header lines.
pub fn parse_net_dev(content: &str) -> Result<Vec<(String, CounterVector)>> {
    let mut interfaces = Vec::new();
    for line in content.lines().skip(2) {
        let Some((name, values)) = line.split_once(':') else {
            continue;
        };
        let values = values
            .split_whitespace()
            .map(|v| parse_u64("/proc/net/dev", line, v))
            .collect::<Result<Vec<u64>>>()?;
        interfaces.push((
            name.trim().to_string(),
            CounterVector::padded(EntityKind::NetworkInterface, values),
        ));
    }
    Ok(interfaces)
}

pub fn parse_meminfo(content: &str) -> Result<MemInfo> {
    let mut values: HashMap<&str, u64> = HashMap::new();
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let key = key.trim_end_matches(':');
        values.insert(key, parse_u64("/proc/meminfo", line, value)?);
    }
    let field = |key: &str| -> Result<u64> {
        values
            .get(key)
            .copied()
            .ok_or_else(|| CollectError::malformed("/proc/meminfo", format!("missing {key}")))
    };
    Ok(MemInfo {
        total: field("MemTotal")?,
        free: field("MemFree")?,
        swap_total: field("SwapTotal")?,
        swap_free: field("SwapFree")?,
        cached: field("Cached")?,
        buffers: field("Buffers")?,
        active: field("Active")?,
    })
}

/// Seconds since boot, the first field of `/proc/uptime`.
pub fn parse_uptime(content: &str) -> Result<f64> {
    content
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| CollectError::malformed("/proc/uptime", content.trim()))
}
