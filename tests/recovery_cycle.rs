mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use provider_shield::config::{MonitorConfig, RecoveryConfig, ServiceConfig};
use provider_shield::events::kinds;
use provider_shield::health::health_check_fn;
use provider_shield::orchestrator::operation_fn;
use provider_shield::resilience::CircuitState;
use provider_shield::{ProviderError, ShieldConfig, ShieldContext};

fn fast_recovery() -> RecoveryConfig {
    RecoveryConfig {
        max_attempts: 3,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        health_check_interval_secs: 0,
        ..RecoveryConfig::default()
    }
}

#[tokio::test]
async fn test_http_probe_drives_recovery() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let addr = common::start_programmable_backend(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                503
            } else {
                200
            }
        }
    })
    .await;

    let mut service = ServiceConfig::new("helius");
    service.circuit.failure_threshold = 1;
    service.recovery = Some(fast_recovery());
    service.health_url = Some(format!("http://{}/health", addr));
    let config = ShieldConfig {
        services: vec![service],
        ..ShieldConfig::default()
    };
    let context = ShieldContext::from_config(&config).unwrap();
    let orch = context.orchestrator();
    let recovery = context.recovery();

    let failing = operation_fn(|_| async { Err(ProviderError::network("connection reset")) });
    orch.execute_with_fallback("helius", failing.as_ref(), Value::Null)
        .await
        .unwrap();
    assert_eq!(orch.breaker_snapshot("helius").unwrap().state, CircuitState::Open);

    assert!(!recovery.check_service_health("helius").await);
    assert!(!recovery.attempt_recovery("helius").await.unwrap());
    assert_eq!(recovery.get_service_status("helius").unwrap().attempts, 1);

    assert!(recovery.attempt_recovery("helius").await.unwrap());
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let status = recovery.get_service_status("helius").unwrap();
    assert_eq!(status.attempts, 0);
    assert!(!status.exhausted);
    assert_eq!(orch.breaker_snapshot("helius").unwrap().state, CircuitState::Closed);

    context.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_monitor_stops_at_max_attempts() {
    let mut service = ServiceConfig::new("helius");
    service.recovery = Some(RecoveryConfig {
        max_attempts: 3,
        ..RecoveryConfig::default()
    });
    let config = ShieldConfig {
        services: vec![service],
        monitor: MonitorConfig {
            enabled: true,
            interval_secs: 30,
        },
        ..ShieldConfig::default()
    };
    let context = ShieldContext::from_config(&config).unwrap();

    let checks = Arc::new(AtomicUsize::new(0));
    let counter = checks.clone();
    context
        .recovery()
        .register_health_check(
            "helius",
            health_check_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(false) }
            }),
        )
        .unwrap();

    let attempts = common::record_events(context.events(), kinds::RECOVERY_ATTEMPT);
    let exhausted = common::record_events(context.events(), kinds::RECOVERY_EXHAUSTED);

    context.spawn_monitor();
    tokio::time::sleep(Duration::from_secs(200)).await;

    let delays: Vec<u64> = attempts
        .lock()
        .unwrap()
        .iter()
        .map(|a| a["delay_ms"].as_u64().unwrap())
        .collect();
    assert_eq!(delays, vec![1000, 2000, 4000]);
    assert!(!exhausted.lock().unwrap().is_empty());
    assert!(context.recovery().get_service_status("helius").unwrap().exhausted);

    context.recovery().reset_attempts("helius").unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(attempts.lock().unwrap().len(), 4);

    context.shutdown().await;
    assert_eq!(context.events().subscriber_count(kinds::RECOVERY_ATTEMPT), 0);
}
