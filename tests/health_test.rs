mod common;

use common::{dead_backend_url, Hits, MockBackend, MockState, Reply};
use perf_orchestrator::config::ClientConfig;
use perf_orchestrator::health::MIN_PROBE_PERIOD;
use perf_orchestrator::store::MemoryStore;
use perf_orchestrator::testing::PerfTesting;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_healthy_backend_parses() {
    let backend = MockBackend::start(MockState::default()).await;
    let testing = backend.testing();

    let status = testing.check_health().await;
    assert_eq!(status.status, "healthy");
    assert!(status.error.is_none());
    assert!(status.java_installed);
    assert!(status.engine_available());
    assert!(status.engine_running());
    assert!(status.ready());
    assert_eq!(status.jmeter_version.as_deref(), Some("5.6.3"));
    assert!(status.extra.contains_key("server_directories"));

    let debug = testing.debug_info().expect("health recorded");
    assert_eq!(debug.health_check, Some(status));
    assert!(debug.last_dispatch.is_none());
}

#[tokio::test]
async fn test_engine_flags_read_either_source() {
    let backend = MockBackend::start(MockState {
        health: Reply::json(
            200,
            json!({
                "status": "healthy",
                "java_installed": true,
                "jmeter_in_path": false,
                "custom_jmeter_exists": true,
                "jmeter_server_running": true,
                "jmeter_port_active": false
            }),
        ),
        ..MockState::default()
    })
    .await;
    let testing = backend.testing();

    let status = testing.check_health().await;
    assert!(status.engine_available());
    assert!(status.engine_running());
    assert!(!status.jmeter_alt_port_active);
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let backend = MockBackend::start(MockState {
        health: Reply::json(200, common::healthy_body()).delayed(Duration::from_millis(800)),
        ..MockState::default()
    })
    .await;
    let mut config = backend.config();
    config.health_timeout = Duration::from_millis(100);
    let testing = PerfTesting::new(config, MemoryStore::shared()).unwrap();

    let status = testing.check_health().await;
    assert_eq!(status.status, "error");
    let error = status.error.as_deref().expect("error reason");
    assert!(error.starts_with("Failed to connect to server"), "{}", error);
    assert!(!status.java_installed);
    assert!(!status.engine_available());
    assert!(!status.engine_running());
    assert!(!status.ready());

    let recorded = testing.debug_info().and_then(|d| d.health_check);
    assert_eq!(recorded, Some(status));
}

#[tokio::test]
async fn test_unreachable_backend_is_unavailable() {
    let url = dead_backend_url().await;
    let testing = PerfTesting::new(ClientConfig::new(&url).unwrap(), MemoryStore::shared()).unwrap();

    let status = testing.check_health().await;
    assert_eq!(status.status, "error");
    assert!(status
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("Failed to connect to server")));
    assert!(!status.jmeter_in_path);
    assert!(!status.jmeter_port_active);
}

#[tokio::test]
async fn test_non_success_status_is_unavailable() {
    let backend = MockBackend::start(MockState {
        health: Reply::json(503, json!({"detail": "starting"})),
        ..MockState::default()
    })
    .await;
    let testing = backend.testing();

    let status = testing.check_health().await;
    assert_eq!(
        status.error.as_deref(),
        Some("Failed to check server health: 503")
    );
    assert!(!status.ready());
}

// --- Recurring prober ---

#[tokio::test]
async fn test_prober_publishes_first_probe_immediately() {
    let backend = MockBackend::start(MockState::default()).await;
    let testing = backend.testing();

    let prober = testing.spawn_health_prober_every(Duration::from_secs(3600));
    let mut updates = prober.subscribe();
    assert!(prober.is_running());

    tokio::time::timeout(Duration::from_secs(5), updates.wait_for(|s| s.is_some()))
        .await
        .expect("first probe lands")
        .unwrap();

    let latest = prober.latest().expect("latest status");
    assert_eq!(latest.status, "healthy");
    assert_eq!(
        testing.debug_info().and_then(|d| d.health_check),
        Some(latest)
    );
}

#[tokio::test]
async fn test_prober_refresh_probes_again() {
    let backend = MockBackend::start(MockState::default()).await;
    let testing = backend.testing();

    let prober = testing.spawn_health_prober_every(Duration::from_secs(3600));
    let mut updates = prober.subscribe();
    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("first probe lands")
        .unwrap();
    assert_eq!(Hits::get(&backend.state.hits.health), 1);

    prober.refresh();
    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("refresh probe lands")
        .unwrap();
    assert_eq!(Hits::get(&backend.state.hits.health), 2);
}

#[tokio::test]
async fn test_prober_stop_halts_requests() {
    let backend = MockBackend::start(MockState::default()).await;
    let testing = backend.testing();

    let mut prober = testing.spawn_health_prober_every(Duration::from_millis(30));
    let mut updates = prober.subscribe();
    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(5), updates.changed())
            .await
            .expect("probe lands")
            .unwrap();
    }

    prober.stop();
    assert!(!prober.is_running());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_stop = Hits::get(&backend.state.hits.health);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(Hits::get(&backend.state.hits.health), after_stop);
}

#[tokio::test]
async fn test_dropping_prober_stops_it() {
    let backend = MockBackend::start(MockState::default()).await;
    let testing = backend.testing();

    {
        let prober = testing.spawn_health_prober_every(Duration::from_millis(30));
        let mut updates = prober.subscribe();
        tokio::time::timeout(Duration::from_secs(5), updates.changed())
            .await
            .expect("probe lands")
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_drop = Hits::get(&backend.state.hits.health);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(Hits::get(&backend.state.hits.health), after_drop);
}

#[tokio::test]
async fn test_zero_period_prober_still_probes() {
    let backend = MockBackend::start(MockState::default()).await;
    let testing = backend.testing();

    let prober = testing.spawn_health_prober_every(Duration::ZERO);
    let mut updates = prober.subscribe();
    tokio::time::timeout(Duration::from_secs(5), updates.wait_for(|s| s.is_some()))
        .await
        .expect("first probe lands")
        .unwrap();

    assert!(prober.is_running());
    assert_eq!(prober.latest().map(|s| s.status).as_deref(), Some("healthy"));

    // Clamped to the minimum period, so ticks keep coming without spinning.
    tokio::time::sleep(MIN_PROBE_PERIOD * 3).await;
    let hits = Hits::get(&backend.state.hits.health);
    assert!(hits >= 2, "only {} probes", hits);
    assert!(hits <= 10, "{} probes in {:?}", hits, MIN_PROBE_PERIOD * 3);
}

