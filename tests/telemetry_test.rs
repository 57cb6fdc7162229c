//! Integration tests for telemetry initialization and span helpers.

use lockq::model::{Action, Status, WorkId};

#[test]
fn telemetry_initializes_without_endpoint() {
    // Only one global subscriber per process; a second init may return
    // Err, which is acceptable here.
    let config = lockq::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "lockq-test".to_string(),
        log_level: "debug".to_string(),
    };
    if let Ok(guard) = lockq::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn work_span_records_transition() {
    let action = Action::new(4).unwrap();
    let span = lockq::telemetry::work::start_work_span(action, WorkId::new());
    lockq::telemetry::work::record_state_transition(&span, Status::Pending, Status::Processing);
}

#[test]
fn metric_instruments_work_without_exporter() {
    use opentelemetry::KeyValue;
    lockq::telemetry::metrics::work_submitted().add(1, &[KeyValue::new("result", "ok")]);
    lockq::telemetry::metrics::wait_duration_ms().record(12.5, &[]);
    lockq::telemetry::metrics::retention_removed().add(2, &[]);
}
