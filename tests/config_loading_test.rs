use fleet_dispatch::{AgentPool, FleetConfig, Location};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_from_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fleet.toml");
    std::fs::write(
        &path,
        r#"
[agents]
count = 2
priorities = [1, 0]
start_positions = [{ x = 3, y = 3 }, { x = -1, y = 0 }]

[dispatch]
step_delay_ms = 25
submit_timeout_ms = 500

[observability]
log_level = "debug"
json_logs = true
"#,
    )
    .unwrap();

    let config = FleetConfig::load_from(&path).unwrap();
    assert_eq!(config.agents.count, 2);
    assert_eq!(config.agents.priorities, vec![1, 0]);
    assert_eq!(
        config.agents.start_positions,
        vec![Location::new(3, 3), Location::new(-1, 0)]
    );
    assert_eq!(config.dispatch.step_delay(), Duration::from_millis(25));
    assert_eq!(config.dispatch.submit_timeout(), Some(Duration::from_millis(500)));
    assert_eq!(config.observability.log_level, "debug");
    assert!(config.observability.json_logs);

    let pool = AgentPool::from_config(&config).unwrap();
    assert_eq!(pool.agents()[0].current_position(), Location::new(3, 3));
    assert_eq!(pool.agents()[1].priority().value(), 0);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fleet.toml");
    std::fs::write(&path, "[dispatch]\nstep_delay_ms = 0\n").unwrap();

    let config = FleetConfig::load_from(&path).unwrap();
    assert_eq!(config.dispatch.step_delay_ms, 0);
    assert_eq!(config.agents, FleetConfig::default().agents);
    assert_eq!(config.observability.log_level, "info");
}

#[test]
fn test_saved_config_loads_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("saved.toml");

    let mut config = FleetConfig::default();
    config.agents.count = 4;
    config.agents.priorities = vec![3, 2, 1, 0];
    config.dispatch.submit_timeout_ms = Some(1500);
    config.save_to_file(&path).unwrap();

    assert_eq!(FleetConfig::load_from(&path).unwrap(), config);
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = FleetConfig::load_from(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_invalid_value_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[agents]\ncount = \"many\"\n").unwrap();

    let err = FleetConfig::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("invalid fleet configuration"));
}
