use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Metric families the agent knows how to produce.
pub const KNOWN_METRICS: &[&str] = &["mem", "cpu", "system", "disks", "nets", "perf"];

/// Agent and report settings, read from one TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Where snapshots are appended, one pretty-printed object per poll.
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,
    /// Enabled families, see [`KNOWN_METRICS`].
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
    /// Data-plane process whose CPU use is reported as `dp-cpu`.
    #[serde(default)]
    pub dp_pid: Option<u32>,
    #[serde(default)]
    pub monitor_qemu: bool,
    /// Track ksoftirqd and vhost kernel threads as `ovs-kernel-cpu`.
    #[serde(default)]
    pub monitor_ovs_kernel: bool,
    #[serde(default = "default_proc_root")]
    pub proc_root: String,
    #[serde(default = "default_sys_root")]
    pub sys_root: String,

    #[serde(default)]
    pub perf: PerfConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfConfig {
    #[serde(default = "default_perf_command")]
    pub command: String,
    /// `perf stat` counter summary.
    #[serde(default = "default_perf_output_path")]
    pub output_path: String,
    /// `perf record` sample data.
    #[serde(default = "default_perf_record_output_path")]
    pub record_output_path: String,
    #[serde(default = "default_perf_events")]
    pub events: Vec<String>,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            command: default_perf_command(),
            output_path: default_perf_output_path(),
            record_output_path: default_perf_record_output_path(),
            events: default_perf_events(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Unix seconds; snapshots before this are skipped.
    #[serde(default)]
    pub start_time: Option<f64>,
    /// Unix seconds; snapshots after this are skipped.
    #[serde(default)]
    pub stop_time: Option<f64>,
    /// Fields summarized per key.
    #[serde(default = "default_cpu_fields")]
    pub cpu_fields: Vec<String>,
    /// Include per-core keys (`cpu0`, `cpu1`, ...) besides the aggregate.
    #[serde(default)]
    pub show_cpu_details: bool,
    /// Per-core keys whose mean idle exceeds this are left out.
    #[serde(default = "default_mute_idlecpu")]
    pub mute_idlecpu: f64,
    #[serde(default)]
    pub pprint: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            start_time: None,
            stop_time: None,
            cpu_fields: default_cpu_fields(),
            show_cpu_details: false,
            mute_idlecpu: default_mute_idlecpu(),
            pprint: false,
        }
    }
}

fn default_output_path() -> String {
    "/tmp/hostmon-agent.out".to_string()
}

fn default_collection_interval() -> u64 {
    1
}

fn default_metrics() -> Vec<String> {
    ["mem", "cpu", "system", "disks", "nets"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_proc_root() -> String {
    "/proc".to_string()
}

fn default_sys_root() -> String {
    "/sys".to_string()
}

fn default_perf_command() -> String {
    "perf".to_string()
}

fn default_perf_output_path() -> String {
    "/tmp/hostmon-perf-stat.out".to_string()
}

fn default_perf_record_output_path() -> String {
    "/tmp/hostmon-perf-record.out".to_string()
}

fn default_perf_events() -> Vec<String> {
    [
        "cycles",
        "instructions",
        "cache-references",
        "cache-misses",
        "bus-cycles",
        "L1-dcache-loads",
        "L1-dcache-load-misses",
        "L1-dcache-stores",
        "dTLB-loads",
        "dTLB-load-misses",
        "dTLB-stores",
        "dTLB-store-misses",
        "iTLB-loads",
        "iTLB-load-misses",
        "LLC-loads",
        "LLC-load-misses",
        "LLC-stores",
        "LLC-store-misses",
        "LLC-prefetches",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_cpu_fields() -> Vec<String> {
    ["user", "system", "idle"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_mute_idlecpu() -> f64 {
    100.0
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            collection_interval_secs: default_collection_interval(),
            metrics: default_metrics(),
            dp_pid: None,
            monitor_qemu: false,
            monitor_ovs_kernel: false,
            proc_root: default_proc_root(),
            sys_root: default_sys_root(),
            perf: PerfConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &str, content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "collection_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.metrics.is_empty() {
            return Err(ConfigError::Invalid("metrics must not be empty".to_string()));
        }
        if let Some(unknown) = self
            .metrics
            .iter()
            .find(|m| !KNOWN_METRICS.contains(&m.as_str()))
        {
            return Err(ConfigError::Invalid(format!(
                "unknown metric '{unknown}', expected one of {}",
                KNOWN_METRICS.join(", ")
            )));
        }
        if self.is_enabled("perf") && self.dp_pid.is_none() {
            return Err(ConfigError::Invalid(
                "dp_pid is required when perf is enabled".to_string(),
            ));
        }
        if let (Some(start), Some(stop)) = (self.report.start_time, self.report.stop_time) {
            if start > stop {
                return Err(ConfigError::Invalid(format!(
                    "report.start_time {start} is after report.stop_time {stop}"
                )));
            }
        }
        Ok(())
    }

    pub fn is_enabled(&self, metric: &str) -> bool {
        self.metrics.iter().any(|m| m == metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AgentConfig::parse("inline", "").unwrap();
        assert_eq!(config.collection_interval_secs, 1);
        assert_eq!(config.output_path, "/tmp/hostmon-agent.out");
        assert!(config.is_enabled("cpu"));
        assert!(!config.is_enabled("perf"));
        assert_eq!(config.report.cpu_fields, vec!["user", "system", "idle"]);
        assert_eq!(config.report.mute_idlecpu, 100.0);
        assert_eq!(config.perf.events.len(), 19);
        assert_eq!(config.perf.record_output_path, "/tmp/hostmon-perf-record.out");
    }

    #[test]
    fn parses_nested_sections() {
        let content = r#"
            metrics = ["cpu", "perf"]
            dp_pid = 4321
            monitor_qemu = true

            [perf]
            command = "sudo perf"

            [report]
            start_time = 10.0
            stop_time = 20.5
            show_cpu_details = true
            mute_idlecpu = 90.0
        "#;
        let config = AgentConfig::parse("inline", content).unwrap();
        assert_eq!(config.dp_pid, Some(4321));
        assert!(config.monitor_qemu);
        assert_eq!(config.perf.command, "sudo perf");
        assert_eq!(config.report.start_time, Some(10.0));
        assert_eq!(config.report.stop_time, Some(20.5));
        assert!(config.report.show_cpu_details);
        assert_eq!(config.report.mute_idlecpu, 90.0);
    }

    #[test]
    fn rejects_unknown_metric() {
        let err = AgentConfig::parse("inline", r#"metrics = ["cpu", "gpu"]"#).unwrap_err();
        assert!(err.to_string().contains("unknown metric 'gpu'"));
    }

    #[test]
    fn rejects_perf_without_dp_pid() {
        let err = AgentConfig::parse("inline", r#"metrics = ["perf"]"#).unwrap_err();
        assert!(err.to_string().contains("dp_pid"));
    }

    #[test]
    fn rejects_zero_interval() {
        let err = AgentConfig::parse("inline", "collection_interval_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_inverted_window() {
        let content = "[report]\nstart_time = 20.0\nstop_time = 10.0\n";
        assert!(AgentConfig::parse("inline", content).is_err());
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "collection_interval_secs = 5").unwrap();
        let config = AgentConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.collection_interval_secs, 5);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AgentConfig::load("/nonexistent/hostmon.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
