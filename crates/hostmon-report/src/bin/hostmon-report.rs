use anyhow::{anyhow, bail, Context, Result};
use hostmon_common::config::AgentConfig;
use hostmon_report::aggregate::{open_stream, sources_for, Aggregator};
use hostmon_report::window::TimeWindow;
use serde::Serialize;
use std::env;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Cli {
    config_path: Option<String>,
    start: Option<f64>,
    stop: Option<f64>,
    pprint: bool,
}

enum CliAction {
    Run(Cli),
    Help,
}

fn usage() {
    println!(
        "Usage: hostmon-report [CONFIG] [--start <unix-ts>] [--stop <unix-ts>] [--pprint]\n\n\
         Summarizes the snapshot stream written by hostmon-agent.\n\
         CONFIG defaults to config/agent.toml; flags override its [report] section."
    );
}

fn parse_cli() -> Result<CliAction> {
    let mut cli = Cli::default();
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliAction::Help),
            "--start" => {
                let value = next_value(&mut args, "--start")?;
                cli.start = Some(parse_timestamp(&value, "--start")?);
            }
            "--stop" => {
                let value = next_value(&mut args, "--stop")?;
                cli.stop = Some(parse_timestamp(&value, "--stop")?);
            }
            "--pprint" => cli.pprint = true,
            other if other.starts_with('-') => bail!("unknown argument: {other}"),
            _ if cli.config_path.is_none() => cli.config_path = Some(arg.clone()),
            _ => bail!("unexpected argument: {arg}"),
        }
    }

    Ok(CliAction::Run(cli))
}

fn next_value<I>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| anyhow!("missing value for {flag}"))
}

fn parse_timestamp(value: &str, flag: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .with_context(|| format!("invalid timestamp for {flag}: {value}"))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("hostmon=info".parse()?))
        .init();

    let cli = match parse_cli()? {
        CliAction::Help => {
            usage();
            return Ok(());
        }
        CliAction::Run(cli) => cli,
    };

    let config_path = cli
        .config_path
        .unwrap_or_else(|| "config/agent.toml".to_string());
    let mut config = AgentConfig::load(&config_path)
        .with_context(|| format!("failed to load agent config {config_path}"))?;
    if cli.start.is_some() {
        config.report.start_time = cli.start;
    }
    if cli.stop.is_some() {
        config.report.stop_time = cli.stop;
    }
    config.report.pprint |= cli.pprint;
    config.validate()?;

    if config.is_enabled("cpu") {
        let window = TimeWindow::from_config(&config.report);
        tracing::info!(start = ?window.start(), stop = ?window.stop(), "Summarizing snapshots");

        let stream = open_stream(&config.output_path)?;
        let mut aggregator = Aggregator::new(window, sources_for(&config));
        let kept = aggregator.consume(stream)?;
        tracing::info!(kept, with_cpu = aggregator.accepted(), "Snapshots in window");

        print_json(&aggregator.finish(&config.report), config.report.pprint)?;
    }

    if config.is_enabled("perf") {
        let text = match std::fs::read_to_string(&config.perf.output_path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %config.perf.output_path, error = %e, "Profiler output unavailable");
                String::new()
            }
        };
        print_json(&serde_json::json!({ "PERF_STAT": text }), false)?;
    }

    Ok(())
}
