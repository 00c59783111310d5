//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use choropleth_dashboard::gateway::{CountyRecord, LocalBackend};
use choropleth_dashboard::models::{Constraint, PatternId, PresetPattern};
use choropleth_dashboard::state::{MachineOptions, PatternStateMachine};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores the previous values on unwind and serializes access to the
/// process environment, since tests run in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

/// Five Alabama counties along `X` and `lawA`, with `delta_death_rate` as
/// the outcome. Preset 7 keeps X in [2, 8]; preset 8 keeps X in [0, 4].
pub fn sample_backend() -> LocalBackend {
    let backend = LocalBackend::new();
    for (fips, name, x, law, outcome) in [
        (1001, "Autauga", 1.0, 0.0, 5.0),
        (1003, "Baldwin", 3.0, 0.2, 6.0),
        (1005, "Barbour", 5.0, 0.5, 7.0),
        (1007, "Bibb", 7.0, 0.9, 8.0),
        (1009, "Blount", 9.0, 1.0, 9.0),
    ] {
        backend.add_record(
            CountyRecord::new(fips, name, "Alabama")
                .with_value("X", x)
                .with_value("lawA", law)
                .with_value("delta_death_rate", outcome),
        );
    }
    backend.add_preset(PresetPattern {
        id: PatternId(7),
        constraints: Constraint::new().with("X", 2.0, 8.0),
        constraint_bounds: Constraint::new().with("X", 0.0, 10.0),
        treatment_column: "lawA".to_string(),
        counties_indices: vec![1003, 1005, 1007],
    });
    backend.add_preset(PresetPattern {
        id: PatternId(8),
        constraints: Constraint::new().with("X", 0.0, 4.0),
        constraint_bounds: Constraint::new().with("X", 0.0, 10.0),
        treatment_column: "lawA".to_string(),
        counties_indices: vec![1001, 1003],
    });
    backend.add_file("counties.csv");
    backend.add_file("patterns.json");
    backend.set_treatment_effect(0.5);
    backend
}

pub fn sample_options() -> MachineOptions {
    MachineOptions {
        default_treatment: Some("lawA".to_string()),
        ..MachineOptions::default()
    }
}

pub fn sample_machine(backend: &LocalBackend) -> PatternStateMachine {
    PatternStateMachine::new(Arc::new(backend.clone()), sample_options())
}

/// Serve `app` on an ephemeral localhost port.
#[cfg(feature = "http-server")]
pub async fn serve(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    addr
}
