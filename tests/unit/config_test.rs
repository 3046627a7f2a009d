//! Tests for configuration validation

use std::collections::HashMap;
use std::time::Duration;

use telemetry_delivery::config::{DeliveryConfig, ExecutorConfig};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_delivery_config_defaults() {
    let cfg = DeliveryConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.initial_delay(), Duration::from_secs(60));
    assert_eq!(cfg.max_retry_interval(), None);
    assert_eq!(cfg.delivery.worker_count, 1);
}

#[test]
fn test_delivery_config_invalid_initial_delay() {
    let cfg = DeliveryConfig::default().with_initial_delay_ms(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_delivery_config_cap_below_initial_delay() {
    let cfg = DeliveryConfig::default()
        .with_initial_delay_ms(10_000)
        .with_max_retry_interval_ms(5_000);
    assert!(cfg.validate().is_err());

    let cfg = cfg.with_max_retry_interval_ms(10_000);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.max_retry_interval(), Some(Duration::from_secs(10)));
}

#[test]
fn test_delivery_config_invalid_executor() {
    let cfg = DeliveryConfig::default().with_delivery(ExecutorConfig::new().with_max_queue_depth(0));
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("max_queue_depth"));
}

#[test]
fn test_delivery_config_from_json() {
    let cfg = DeliveryConfig::from_json_str(
        r#"{"initial_delay_ms": 1000, "max_retry_interval_ms": 8000, "delivery": {"worker_count": 2}}"#,
    )
    .unwrap();
    assert_eq!(cfg.initial_delay_ms, 1_000);
    assert_eq!(cfg.max_retry_interval_ms, Some(8_000));
    assert_eq!(cfg.delivery.worker_count, 2);
    assert_eq!(cfg.delivery.max_queue_depth, ExecutorConfig::default().max_queue_depth);
    assert_eq!(cfg.shutdown_timeout_ms, DeliveryConfig::default().shutdown_timeout_ms);
}

#[test]
fn test_delivery_config_from_json_rejects_bad_input() {
    assert!(DeliveryConfig::from_json_str("not json").is_err());
    assert!(DeliveryConfig::from_json_str(r#"{"initial_delay_ms": 0}"#).is_err());
}

#[test]
fn test_delivery_config_from_lookup() {
    let cfg = DeliveryConfig::from_lookup(lookup(&[
        ("TELEMETRY_DELIVERY_INITIAL_DELAY_MS", "2500"),
        ("TELEMETRY_DELIVERY_MAX_RETRY_INTERVAL_MS", " 40000 "),
        ("TELEMETRY_DELIVERY_WORKERS", "2"),
        ("UNRELATED", "x"),
    ]))
    .unwrap();
    assert_eq!(cfg.initial_delay_ms, 2_500);
    assert_eq!(cfg.max_retry_interval_ms, Some(40_000));
    assert_eq!(cfg.delivery.worker_count, 2);
}

#[test]
fn test_delivery_config_from_lookup_names_bad_variable() {
    let err = DeliveryConfig::from_lookup(lookup(&[("TELEMETRY_DELIVERY_SHUTDOWN_TIMEOUT_MS", "soon")]))
        .unwrap_err();
    assert!(err.contains("TELEMETRY_DELIVERY_SHUTDOWN_TIMEOUT_MS"));
}

#[test]
fn test_executor_config_builders() {
    let cfg = ExecutorConfig::new()
        .with_worker_count(3)
        .with_max_queue_depth(10)
        .with_thread_stack_size(256 * 1024);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.worker_count, 3);
    assert_eq!(cfg.max_queue_depth, 10);
}

#[test]
fn test_executor_config_worker_ceiling() {
    let ceiling = num_cpus::get().max(1) * 16;
    assert!(ExecutorConfig::new().with_worker_count(ceiling).validate().is_ok());
    assert!(ExecutorConfig::new().with_worker_count(ceiling + 1).validate().is_err());
}
