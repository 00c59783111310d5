//! End-to-end orchestrator flows over the in-memory backend.

mod support;

use std::sync::Arc;
use std::time::Duration;

use choropleth_dashboard::gateway::{LocalOperation, PresetCache};
use choropleth_dashboard::models::{DataFileSelection, PatternId};
use choropleth_dashboard::services::{
    bin_histogram, compute_summary_statistics, find_county_by_values, metric_checks, BinOptions,
};
use choropleth_dashboard::state::{AnalysisPhase, MapPhase, PatternStateMachine};

async fn wait(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_slider_burst_sends_one_map_request() {
    let backend = support::sample_backend();
    let machine = support::sample_machine(&backend);
    machine.discover_columns().await.unwrap();
    machine.select_pattern(PatternId(7)).await.unwrap();
    wait(400).await;
    assert_eq!(backend.call_count(LocalOperation::MapOnly), 1);

    for high in [7.0, 6.0, 5.0, 4.0] {
        assert!(machine.update_slider("X", [2.0, high]));
        wait(50).await;
    }
    wait(400).await;

    assert_eq!(backend.call_count(LocalOperation::MapOnly), 2);
    let last = backend.queries(LocalOperation::MapOnly).pop().unwrap();
    let x = *last.constraints.as_ref().and_then(|c| c.get("X")).unwrap();
    assert!((x.ub - 4.0).abs() < 1e-9);

    let state = machine.snapshot();
    assert_eq!(state.map_phase, MapPhase::Ready);
    assert_eq!(state.geomap.all_indices, vec![1003]);
    assert_eq!(state.map_query.as_ref(), Some(&last));
}

#[tokio::test(start_paused = true)]
async fn test_preset_cache_spans_the_session_until_reload() {
    let backend = support::sample_backend();
    let cache = Arc::new(PresetCache::new(Arc::new(backend.clone())));
    let machine = PatternStateMachine::new(cache.clone(), support::sample_options());
    machine.discover_columns().await.unwrap();

    machine.select_pattern(PatternId(7)).await.unwrap();
    machine.select_pattern(PatternId(8)).await.unwrap();
    machine.select_pattern(PatternId(7)).await.unwrap();

    assert_eq!(backend.call_count(LocalOperation::PresetPattern), 2);
    assert_eq!(cache.len(), 2);
    assert_eq!(machine.snapshot().selected_pattern, Some(PatternId(7)));

    machine
        .change_data_files(DataFileSelection {
            main_file: "counties.csv".to_string(),
            pattern_file: Some("patterns.json".to_string()),
        })
        .await
        .unwrap();
    assert!(cache.is_empty());

    machine.select_pattern(PatternId(7)).await.unwrap();
    assert_eq!(backend.call_count(LocalOperation::PresetPattern), 3);
}

#[tokio::test(start_paused = true)]
async fn test_analysis_feeds_presentation_services() {
    let backend = support::sample_backend();
    backend.set_cross_validation(0.12);
    let machine = support::sample_machine(&backend);
    machine.discover_columns().await.unwrap();
    machine.select_pattern(PatternId(7)).await.unwrap();
    machine.run_analysis().await;

    let highlighted = machine.highlight_county(1007).unwrap();
    assert_eq!(highlighted.position, 1);
    assert_eq!(highlighted.county_name.as_deref(), Some("Bibb"));

    let state = machine.snapshot();
    assert_eq!(state.analysis_phase, AnalysisPhase::Ready);
    let analysis = state.analysis.as_ref().unwrap();

    let histogram = bin_histogram(
        &analysis.histogram.inactive_values,
        &analysis.histogram.active_values,
        &BinOptions {
            bin_count: 4,
            negative_inactive: false,
            highlight_active: Some(highlighted.active_value),
            highlight_inactive: Some(highlighted.inactive_value),
        },
    );
    assert_eq!(histogram.total_inactive(), 2);
    assert_eq!(histogram.total_active(), 2);
    assert!(histogram.bins[3].is_highlighted_active);
    assert!(histogram.bins[3].is_highlighted_inactive);
    assert!(!histogram.bins[0].is_highlighted_active);

    // Clicking a bar resolves back to the same county.
    let found = find_county_by_values(
        analysis,
        Some(highlighted.active_value),
        Some(highlighted.inactive_value),
    )
    .unwrap();
    assert_eq!(found.county_id, 1007);

    let statistics = compute_summary_statistics(&analysis.histogram);
    assert_eq!(statistics.avg_ite, 0.5);
    let checks = metric_checks(&statistics, state.k_fold_score);
    assert_eq!(checks.k_fold_in_band, Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_data_change_resets_session_and_rediscovers() {
    let backend = support::sample_backend();
    let machine = support::sample_machine(&backend);
    machine.discover_columns().await.unwrap();
    machine.select_pattern(PatternId(7)).await.unwrap();
    machine.run_analysis().await;
    machine.highlight_county(1003);

    backend.add_file("counties_2024.csv");
    machine
        .change_data_files(DataFileSelection {
            main_file: "counties_2024.csv".to_string(),
            pattern_file: None,
        })
        .await
        .unwrap();

    let state = machine.snapshot();
    assert_eq!(state.epoch, 1);
    assert!(state.analysis.is_none());
    assert!(state.highlighted.is_none());
    assert!(state.sliders.is_empty());
    assert_eq!(state.selected_pattern, None);
    assert_eq!(state.columns.len(), 3);
    assert_eq!(state.query.treatment_column, "lawA");

    // Nothing scheduled before the reload lands afterwards.
    let map_calls = backend.call_count(LocalOperation::MapOnly);
    wait(1000).await;
    assert_eq!(backend.call_count(LocalOperation::MapOnly), map_calls);
    assert!(machine.take_alerts().is_empty());
}
