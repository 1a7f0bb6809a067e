use anyhow::{Context, Result};
use hostmon_common::config::PerfConfig;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// The two profiler runs attached to the data-plane process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfMode {
    /// Counter totals, read back by `hostmon-report` as `PERF_STAT`.
    Stat,
    /// Sampled profile for offline `perf report`.
    Record,
}

impl PerfMode {
    pub fn subcommand(self) -> &'static str {
        match self {
            PerfMode::Stat => "stat",
            PerfMode::Record => "record",
        }
    }

    pub fn output_path(self, config: &PerfConfig) -> &str {
        match self {
            PerfMode::Stat => &config.output_path,
            PerfMode::Record => &config.record_output_path,
        }
    }
}

/// Arguments for `perf <mode>` attached to `pid`, writing to the configured file.
pub fn perf_args(config: &PerfConfig, mode: PerfMode, pid: u32) -> Vec<String> {
    vec![
        mode.subcommand().to_string(),
        "-e".to_string(),
        config.events.join(","),
        "-p".to_string(),
        pid.to_string(),
        "-o".to_string(),
        mode.output_path(config).to_string(),
    ]
}

/// Starts the profiler in the background.
///
/// The previous output file is removed first so the report never shows a
/// stale run. The profiler writes its results when it exits, either with
/// the target process or on the interrupt that also stops the agent.
pub async fn spawn_perf(config: &PerfConfig, mode: PerfMode, pid: u32) -> Result<Child> {
    let output = mode.output_path(config);
    match tokio::fs::remove_file(output).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("failed to remove {output}")),
    }

    let child = Command::new(&config.command)
        .args(perf_args(config, mode, pid))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to start {} {}", config.command, mode.subcommand()))?;
    tracing::info!(pid, mode = mode.subcommand(), output, "Profiler started");
    Ok(child)
}

pub async fn spawn_perf_stat(config: &PerfConfig, pid: u32) -> Result<Child> {
    spawn_perf(config, PerfMode::Stat, pid).await
}

pub async fn spawn_perf_record(config: &PerfConfig, pid: u32) -> Result<Child> {
    spawn_perf(config, PerfMode::Record, pid).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn perf_config(command: &str, dir: &std::path::Path) -> PerfConfig {
        PerfConfig {
            command: command.to_string(),
            output_path: dir.join("perf-stat.out").display().to_string(),
            record_output_path: dir.join("perf-record.out").display().to_string(),
            events: vec!["cycles".to_string(), "instructions".to_string()],
        }
    }

    #[test]
    fn stat_args_attach_to_pid() {
        let config = perf_config("perf", std::path::Path::new("/tmp"));
        assert_eq!(
            perf_args(&config, PerfMode::Stat, 4242),
            vec!["stat", "-e", "cycles,instructions", "-p", "4242", "-o", "/tmp/perf-stat.out"]
        );
    }

    #[test]
    fn record_args_use_record_output() {
        let config = perf_config("perf", std::path::Path::new("/tmp"));
        assert_eq!(
            perf_args(&config, PerfMode::Record, 4242),
            vec!["record", "-e", "cycles,instructions", "-p", "4242", "-o", "/tmp/perf-record.out"]
        );
    }

    #[tokio::test]
    async fn spawn_removes_stale_output() {
        let dir = TempDir::new().unwrap();
        let config = perf_config("true", dir.path());
        std::fs::write(&config.output_path, "old stat").unwrap();
        std::fs::write(&config.record_output_path, "old record").unwrap();

        let mut stat = spawn_perf_stat(&config, 1).await.unwrap();
        stat.wait().await.unwrap();
        assert!(!std::path::Path::new(&config.output_path).exists());
        assert!(std::path::Path::new(&config.record_output_path).exists());

        let mut record = spawn_perf_record(&config, 1).await.unwrap();
        record.wait().await.unwrap();
        assert!(!std::path::Path::new(&config.record_output_path).exists());
    }

    #[tokio::test]
    async fn spawn_reports_missing_command() {
        let dir = TempDir::new().unwrap();
        let config = perf_config("hostmon-no-such-profiler", dir.path());
        let err = spawn_perf_record(&config, 1).await.unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
