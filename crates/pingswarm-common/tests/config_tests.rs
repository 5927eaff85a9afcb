use pingswarm_common::{ConfigError, FailurePolicy, ResponseMode, RunConfig, MAX_RESPONSE_LEN};
use std::time::Duration;

#[test]
fn empty_document_yields_defaults() {
    let config = RunConfig::from_yaml("{}").unwrap();

    assert_eq!(config.target.host, "127.0.0.1");
    assert_eq!(config.target.base_port, 8888);
    assert_eq!(config.target.server_count, 1);
    assert_eq!(config.workers.count, 1);
    assert_eq!(config.workers.connections_per_worker, 1000);
    assert_eq!(config.workers.rounds, 30);
    assert_eq!(config.workers.round_interval(), Duration::from_secs(60));
    assert_eq!(config.workers.connect_stagger(), None);
    assert_eq!(config.probe.message, "ping\n");
    assert_eq!(config.probe.response, ResponseMode::Fixed { len: 5 });
    assert_eq!(config.probe.failure_policy, FailurePolicy::Record);
    assert_eq!(config.timeouts.connect(), None);
    assert_eq!(config.timeouts.io(), None);
    assert!(!config.metrics.enabled);
    assert!(config.logging.json);
}

#[test]
fn full_document_parses() {
    let yaml = r#"
target:
  host: 10.0.0.5
  base_port: 9000
  server_count: 4
workers:
  count: 10
  connections_per_worker: 500
  rounds: 10
  round_interval_secs: 30
  connect_stagger_ms: 2
probe:
  message: "hello\n"
  response:
    mode: line
  failure_policy: fail-fast
timeouts:
  connect_ms: 1500
  io_ms: 800
metrics:
  enabled: true
  port: 9100
logging:
  json: false
"#;
    let config = RunConfig::from_yaml(yaml).unwrap();

    assert_eq!(config.target.host, "10.0.0.5");
    assert_eq!(config.target.server_count, 4);
    assert_eq!(config.workers.connections_per_worker, 500);
    assert_eq!(config.workers.connect_stagger(), Some(Duration::from_millis(2)));
    assert_eq!(config.probe.message, "hello\n");
    assert_eq!(config.probe.response, ResponseMode::Line);
    assert_eq!(config.probe.failure_policy, FailurePolicy::FailFast);
    assert_eq!(config.timeouts.connect(), Some(Duration::from_millis(1500)));
    assert_eq!(config.timeouts.io(), Some(Duration::from_millis(800)));
    assert!(config.metrics.enabled);
    assert!(!config.logging.json);
}

#[test]
fn fixed_response_length_is_configurable() {
    let config =
        RunConfig::from_yaml("probe:\n  response:\n    mode: fixed\n    len: 12\n").unwrap();
    assert_eq!(config.probe.response, ResponseMode::Fixed { len: 12 });
}

#[test]
fn zero_server_count_is_invalid() {
    let err = RunConfig::from_yaml("target:\n  server_count: 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn port_range_past_65535_is_invalid() {
    let err = RunConfig::from_yaml("target:\n  base_port: 65530\n  server_count: 10\n").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("65535")));

    assert!(RunConfig::from_yaml("target:\n  base_port: 65530\n  server_count: 6\n").is_ok());
}

#[test]
fn zero_workers_and_empty_probe_are_invalid() {
    assert!(RunConfig::from_yaml("workers:\n  count: 0\n").is_err());
    assert!(RunConfig::from_yaml("probe:\n  message: \"\"\n").is_err());
    assert!(RunConfig::from_yaml("probe:\n  response:\n    mode: fixed\n    len: 0\n").is_err());
}

#[test]
fn fixed_response_length_is_capped() {
    let yaml = |len: &str| format!("probe:\n  response:\n    mode: fixed\n    len: {}\n", len);

    let err = RunConfig::from_yaml(&yaml("65537")).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    let err = RunConfig::from_yaml(&yaml("18446744073709551615")).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));

    let config = RunConfig::from_yaml(&yaml(&MAX_RESPONSE_LEN.to_string())).unwrap();
    assert_eq!(config.probe.response, ResponseMode::Fixed { len: 65536 });
}

#[test]
fn parse_accepts_what_validate_rejects() {
    let config = RunConfig::parse("workers:\n  count: 0\n").unwrap();
    assert_eq!(config.workers.count, 0);
    assert!(config.validate().is_err());
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let err = RunConfig::from_yaml("workers: [1, 2").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = RunConfig::load("/nonexistent/pingswarm.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn failure_policy_from_str() {
    assert_eq!("ignore".parse::<FailurePolicy>().unwrap(), FailurePolicy::Ignore);
    assert_eq!("record".parse::<FailurePolicy>().unwrap(), FailurePolicy::Record);
    assert_eq!("fail-fast".parse::<FailurePolicy>().unwrap(), FailurePolicy::FailFast);
    assert!("retry".parse::<FailurePolicy>().is_err());
}
