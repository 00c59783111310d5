//! Environment overrides on top of file configuration.

mod support;

use choropleth_dashboard::config::{ConfigError, DashboardConfig};
use std::io::Write;
use std::time::Duration;
use support::with_scoped_env;

const ALL_KEYS: [&str; 5] = [
    "DASHBOARD_BACKEND",
    "BACKEND_URL",
    "HOST",
    "PORT",
    "DASHBOARD_SETTLE_MS",
];

fn cleared() -> Vec<(&'static str, Option<&'static str>)> {
    ALL_KEYS.iter().map(|k| (*k, None)).collect()
}

#[test]
fn test_no_env_keeps_defaults() {
    with_scoped_env(&cleared(), || {
        let mut config = DashboardConfig::default();
        config.apply_env().unwrap();

        assert_eq!(config.backend.kind, "http");
        assert_eq!(config.backend.url, "http://localhost:5001");
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.scheduler.settle(), Duration::from_millis(300));
    });
}

#[test]
fn test_env_overrides_file_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[backend]
url = "http://analysis:9000"

[server]
port = 3000
"#
    )
    .unwrap();

    let mut changes = cleared();
    changes.extend([
        ("BACKEND_URL", Some("http://127.0.0.1:5001")),
        ("PORT", Some("9090")),
        ("DASHBOARD_SETTLE_MS", Some("150")),
        ("DASHBOARD_BACKEND", Some("local")),
    ]);

    with_scoped_env(&changes, || {
        let mut config = DashboardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 3000);

        config.apply_env().unwrap();
        assert_eq!(config.backend.url, "http://127.0.0.1:5001");
        assert_eq!(config.backend.kind, "local");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.scheduler.settle_ms, 150);
    });
}

#[test]
fn test_blank_url_is_ignored() {
    let mut changes = cleared();
    changes.push(("BACKEND_URL", Some("  ")));

    with_scoped_env(&changes, || {
        let mut config = DashboardConfig::default();
        config.apply_env().unwrap();
        assert_eq!(config.backend.url, "http://localhost:5001");
    });
}

#[test]
fn test_invalid_port_is_rejected() {
    let mut changes = cleared();
    changes.push(("PORT", Some("eighty")));

    with_scoped_env(&changes, || {
        let mut config = DashboardConfig::default();
        match config.apply_env() {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, "PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("expected invalid value, got {:?}", other),
        }
    });
}
