use crate::aggregate::{is_core_key, open_stream, read_snapshots, sources_for, Aggregator};
use crate::error::ReportError;
use crate::window::TimeWindow;
use hostmon_common::config::{AgentConfig, ReportConfig};
use hostmon_common::types::Snapshot;
use serde_json::json;

fn make_snapshot(ts: f64, cpu1_idle: f64) -> Snapshot {
    let mut snap = Snapshot::at(ts);
    snap.insert(
        "cpu",
        json!({
            "cpu": {"user": 3.0, "system": 1.0, "idle": 96.0, "nice": 0.0},
            "cpu1": {"user": 2.0, "system": 1.0, "idle": cpu1_idle, "nice": 0.0},
        }),
    );
    snap
}

/// Renders snapshots the way the agent appends them.
fn make_stream(snapshots: &[Snapshot]) -> String {
    snapshots
        .iter()
        .map(|s| format!("\n{}", serde_json::to_string_pretty(s).unwrap()))
        .collect()
}

fn details(mute_idlecpu: f64) -> ReportConfig {
    ReportConfig {
        show_cpu_details: true,
        mute_idlecpu,
        ..ReportConfig::default()
    }
}

#[test]
fn window_selects_first_two_polls() {
    let stream = make_stream(&[
        make_snapshot(100.0, 95.0),
        make_snapshot(101.0, 96.0),
        make_snapshot(102.0, 97.0),
    ]);
    let mut aggregator = Aggregator::new(TimeWindow::new(Some(100.0), Some(101.0)), ["cpu"]);
    assert_eq!(aggregator.consume(stream.as_bytes()).unwrap(), 2);
    assert_eq!(aggregator.accepted(), 2);

    let report = aggregator.finish(&details(100.0));
    let idle = report.cpu_stat["cpu1"]["idle"];
    assert_eq!(idle.mean, 95.5);
    assert_eq!(idle.min, 95.0);
    assert_eq!(idle.max, 96.0);
    assert_eq!(idle.std, 0.5);
}

#[test]
fn per_core_keys_hidden_without_details() {
    let stream = make_stream(&[make_snapshot(1.0, 50.0), make_snapshot(2.0, 60.0)]);
    let mut aggregator = Aggregator::new(TimeWindow::unbounded(), ["cpu"]);
    aggregator.consume(stream.as_bytes()).unwrap();

    let report = aggregator.finish(&ReportConfig::default());
    assert!(report.cpu_stat.contains_key("cpu"));
    assert!(!report.cpu_stat.contains_key("cpu1"));
}

#[test]
fn idle_cores_are_muted() {
    let stream = make_stream(&[make_snapshot(1.0, 99.0), make_snapshot(2.0, 98.0)]);
    let mut aggregator = Aggregator::new(TimeWindow::unbounded(), ["cpu"]);
    aggregator.consume(stream.as_bytes()).unwrap();

    assert!(!aggregator.finish(&details(90.0)).cpu_stat.contains_key("cpu1"));
    assert!(aggregator.finish(&details(99.0)).cpu_stat.contains_key("cpu1"));
    // The aggregate line is never muted.
    assert!(aggregator.finish(&details(10.0)).cpu_stat.contains_key("cpu"));
}

#[test]
fn only_configured_fields_are_summarized() {
    let stream = make_stream(&[make_snapshot(1.0, 50.0)]);
    let mut aggregator = Aggregator::new(TimeWindow::unbounded(), ["cpu"]);
    aggregator.consume(stream.as_bytes()).unwrap();

    let config = ReportConfig {
        cpu_fields: vec!["user".to_string()],
        ..ReportConfig::default()
    };
    let report = aggregator.finish(&config);
    let fields: Vec<&String> = report.cpu_stat["cpu"].keys().collect();
    assert_eq!(fields, vec!["user"]);
}

#[test]
fn merges_process_families() {
    let mut snap = make_snapshot(1.0, 50.0);
    snap.insert("dp-cpu", json!({"dp_process_cpu": {"user": 40.0, "system": 10.0}}));
    snap.insert("qemu-cpu", json!({"qemu_42": {"user": 5.0, "system": 1.0}}));
    snap.insert(
        "ovs-kernel-cpu",
        json!({"ovs-kernel": {"user": 0.0, "system": 2.0}}),
    );
    let stream = make_stream(&[snap]);

    let mut aggregator = Aggregator::new(TimeWindow::unbounded(), ["cpu", "dp-cpu", "qemu-cpu"]);
    aggregator.consume(stream.as_bytes()).unwrap();
    let report = aggregator.finish(&ReportConfig::default());

    assert_eq!(report.cpu_stat["dp_process_cpu"]["user"].mean, 40.0);
    assert_eq!(report.cpu_stat["qemu_42"]["system"].max, 1.0);
    assert!(!report.cpu_stat.contains_key("ovs-kernel"));
}

#[test]
fn report_serializes_under_cpu_stat() {
    let stream = make_stream(&[make_snapshot(1.0, 50.0)]);
    let mut aggregator = Aggregator::new(TimeWindow::unbounded(), ["cpu"]);
    aggregator.consume(stream.as_bytes()).unwrap();

    let value = serde_json::to_value(aggregator.finish(&ReportConfig::default())).unwrap();
    assert_eq!(
        value["CPU_STAT"]["cpu"]["user"],
        json!({"min": 3.0, "max": 3.0, "mean": 3.0, "std": 0.0})
    );
}

#[test]
fn snapshots_without_cpu_are_not_counted() {
    let mut mem_only = Snapshot::at(5.0);
    mem_only.insert("mem", json!({"total": 1}));
    let stream = make_stream(&[mem_only, make_snapshot(6.0, 50.0)]);

    let mut aggregator = Aggregator::new(TimeWindow::unbounded(), ["cpu"]);
    assert_eq!(aggregator.consume(stream.as_bytes()).unwrap(), 2);
    assert_eq!(aggregator.accepted(), 1);
}

#[test]
fn incomplete_last_record_is_ignored() {
    let mut stream = make_stream(&[make_snapshot(1.0, 95.0), make_snapshot(2.0, 97.0)]);
    stream.push_str("\n{\"3.0\": {\"cpu\": {\"cpu1\": {\"idle\": 9");

    let mut aggregator = Aggregator::new(TimeWindow::unbounded(), ["cpu"]);
    assert_eq!(aggregator.consume(stream.as_bytes()).unwrap(), 2);

    let report = aggregator.finish(&details(100.0));
    assert_eq!(report.cpu_stat["cpu1"]["idle"].mean, 96.0);
}

#[test]
fn cut_off_stream_keeps_complete_records() {
    let mut stream = make_stream(&[make_snapshot(1.0, 50.0), make_snapshot(2.0, 50.0)]);
    stream.truncate(stream.len() - 5);

    let results: Vec<_> = read_snapshots(stream.as_bytes()).collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
}

#[test]
fn malformed_record_mid_stream_is_an_error() {
    let mut stream = make_stream(&[make_snapshot(1.0, 50.0)]);
    stream.push_str("\n{\"2.0\": nope}\n");
    stream.push_str(&make_stream(&[make_snapshot(3.0, 50.0)]));

    let mut aggregator = Aggregator::new(TimeWindow::unbounded(), ["cpu"]);
    let err = aggregator.consume(stream.as_bytes()).unwrap_err();
    assert!(matches!(err, ReportError::Parse { parsed: 1, .. }));
}

#[test]
fn core_key_detection() {
    assert!(is_core_key("cpu0"));
    assert!(is_core_key("cpu17"));
    assert!(!is_core_key("cpu"));
    assert!(!is_core_key("cpux"));
    assert!(!is_core_key("dp_process_cpu"));
}

#[test]
fn sources_follow_agent_config() {
    let config = AgentConfig::parse("agent.toml", "dp_pid = 9\nmonitor_ovs_kernel = true\n").unwrap();
    assert_eq!(sources_for(&config), vec!["cpu", "dp-cpu", "ovs-kernel-cpu"]);
}

#[test]
fn reads_stream_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("agent.out");
    std::fs::write(&path, make_stream(&[make_snapshot(1.0, 50.0)])).unwrap();

    let mut aggregator = Aggregator::new(TimeWindow::unbounded(), ["cpu"]);
    assert_eq!(aggregator.consume(open_stream(&path).unwrap()).unwrap(), 1);
}

#[test]
fn missing_stream_names_the_path() {
    let err = open_stream("/nonexistent/hostmon-agent.out").unwrap_err();
    assert!(matches!(err, ReportError::Read { .. }));
    assert!(err.to_string().contains("/nonexistent/hostmon-agent.out"));
}
