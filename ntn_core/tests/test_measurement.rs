use ntn_common::model::{Extras, HandoverEvent, HandoverResult, Scheme};
use ntn_core::measurement::MeasurementCore;

fn event(scheme: Scheme, latency_ms: f64, result: HandoverResult) -> HandoverEvent {
    HandoverEvent {
        id: 0,
        ue_id: "ue-1".into(),
        source_gnb: "gnb-a".into(),
        target_gnb: "gnb-b".into(),
        scheme,
        start_s: 0.0,
        end_s: latency_ms / 1000.0,
        latency_ms,
        result,
        extras: Extras::new(),
    }
}

/// S5 — Baseline mean ~250ms, Proposed mean ~25ms, all Success.
#[test]
fn scenario_s5_measurement_comparison() {
    let core = MeasurementCore::new(std::env::temp_dir().join("ntn-core-measurement-test").to_string_lossy().to_string());
    for _ in 0..100 {
        core.record(event(Scheme::Baseline, 250.0, HandoverResult::Success));
        core.record(event(Scheme::Proposed, 25.0, HandoverResult::Success));
    }

    let report = core.compare_report();
    assert!(report.overall_reproduction_success);
    assert!((report.latency_reduction_pct - 90.0).abs() < 1.0);
    assert!(report.baseline_meets_target);
    assert!(report.proposed_meets_target);
}

#[test]
fn record_assigns_monotonically_increasing_ids() {
    let core = MeasurementCore::new(std::env::temp_dir().join("ntn-core-measurement-test").to_string_lossy().to_string());
    let first = core.record(event(Scheme::Baseline, 200.0, HandoverResult::Success));
    let second = core.record(event(Scheme::Baseline, 210.0, HandoverResult::Success));
    assert!(second > first);
    assert_eq!(core.event_count(), 2);
}

#[test]
fn analyse_is_cached_until_a_new_event_is_recorded() {
    let core = MeasurementCore::new(std::env::temp_dir().join("ntn-core-measurement-test").to_string_lossy().to_string());
    core.record(event(Scheme::Proposed, 20.0, HandoverResult::Success));
    let first = core.analyse(false);
    core.record(event(Scheme::Proposed, 999.0, HandoverResult::Failure));
    let second = core.analyse(false);
    assert_ne!(first[&Scheme::Proposed].count, second[&Scheme::Proposed].count);
}

#[test]
fn export_json_writes_a_readable_file() {
    let core = MeasurementCore::new(std::env::temp_dir().join("ntn-core-measurement-export-test").to_string_lossy().to_string());
    core.record(event(Scheme::Baseline, 250.0, HandoverResult::Success));
    let path = core.export_json().expect("export should succeed");
    let contents = std::fs::read_to_string(path).unwrap();
    assert!(contents.contains("\"events\""));
}
