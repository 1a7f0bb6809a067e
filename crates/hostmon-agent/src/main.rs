mod perf;
mod sink;
mod snapshot;

use anyhow::{Context, Result};
use chrono::Utc;
use hostmon_collector::source::ProcSource;
use hostmon_common::config::AgentConfig;
use perf::PerfMode;
use sink::JsonSink;
use snapshot::{collectors_for, SnapshotAssembler};
use tokio::signal;
use tokio::time::{interval, timeout_at, Duration, Instant, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hostmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)
        .with_context(|| format!("failed to load agent config {config_path}"))?;
    tracing::info!(config = %config_path, "hostmon-agent starting");

    let source = ProcSource::new(&config.proc_root, &config.sys_root);
    let mut assembler = SnapshotAssembler::new(collectors_for(&config), Box::new(source));
    let mut sink = JsonSink::create(&config.output_path).await?;

    let mut profilers = Vec::new();
    if let Some(pid) = config.dp_pid.filter(|_| config.is_enabled("perf")) {
        profilers.push((PerfMode::Stat, perf::spawn_perf_stat(&config.perf, pid).await?));
        profilers.push((PerfMode::Record, perf::spawn_perf_record(&config.perf, pid).await?));
    }

    let mut tick = interval(Duration::from_secs(config.collection_interval_secs));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        interval_secs = config.collection_interval_secs,
        families = ?assembler.families(),
        output = %sink.path().display(),
        "Starting collection loop"
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let snapshot = assembler.poll(Utc::now());
                if let Err(e) = sink.append(&snapshot).await {
                    tracing::warn!(error = %e, "Failed to write snapshot");
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutting down gracefully");
                break;
            }
        }
    }

    // The interrupt reaches the profilers too; give them time to write their output.
    let deadline = Instant::now() + Duration::from_secs(5);
    for (mode, child) in &mut profilers {
        let mode = mode.subcommand();
        match timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => tracing::info!(mode, %status, "Profiler exited"),
            Ok(Err(e)) => tracing::warn!(mode, error = %e, "Failed to wait for profiler"),
            Err(_) => tracing::warn!(mode, "Profiler still running after shutdown"),
        }
    }

    Ok(())
}
