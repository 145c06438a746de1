//! Timeout Integration Tests
//!
//! A model that never answers must cost bounded time, degrade every
//! request gracefully, and trip the circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use ticketai::adapters::{MockBehavior, MockProvider, ModelSettings};
use ticketai::core::{CircuitBreakerSettings, CircuitState, HealthStatus, RetryPolicy};
use ticketai::{TicketInput, TriageConfig, TriagePipeline};

const TICKET: &str = "Customer cannot log in, error code 500, very urgent!!!";

fn config(timeout_seconds: u64, max_retries: u32) -> TriageConfig {
    TriageConfig {
        model: ModelSettings {
            timeout_seconds,
            retry: RetryPolicy {
                max_retries,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

fn pipeline(config: TriageConfig, provider: Arc<MockProvider>) -> TriagePipeline {
    TriagePipeline::builder(config)
        .provider(provider)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_always_timing_out_degrades() {
    let provider = Arc::new(MockProvider::hanging());
    let pipeline = pipeline(TriageConfig::default(), provider.clone());

    let started = tokio::time::Instant::now();
    let result = pipeline.triage(TicketInput::new(TICKET, "alice")).await.unwrap();
    let elapsed = started.elapsed();

    assert!(!result.metadata.success);
    assert!(result.needs_human_review);
    assert_eq!(result.category, "General");
    assert_eq!(result.queue, "Support L1");
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.summary, "Automated triage unavailable: model timeout");

    // Three 30s attempts plus backoff (1s + 2s, each with up to 20% jitter)
    assert_eq!(provider.calls(), 3);
    assert!(elapsed >= Duration::from_secs(93));
    assert!(elapsed <= Duration::from_millis(93_600));
    assert_eq!(result.metadata.latency_ms, elapsed.as_millis() as u64);
}

#[tokio::test(start_paused = true)]
async fn test_per_attempt_timeout_respected() {
    let provider = Arc::new(MockProvider::new().with_latency(Duration::from_secs(8)));
    let pipeline = pipeline(config(5, 0), provider.clone());

    let result = pipeline.triage(TicketInput::new(TICKET, "alice")).await.unwrap();
    assert!(!result.metadata.success);
    assert_eq!(result.metadata.latency_ms, 5000);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_but_within_timeout_succeeds() {
    let provider = Arc::new(MockProvider::new().with_latency(Duration::from_secs(4)));
    let pipeline = pipeline(config(5, 0), provider);

    let result = pipeline.triage(TicketInput::new(TICKET, "alice")).await.unwrap();
    assert!(result.metadata.success);
    assert_eq!(result.metadata.latency_ms, 4000);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_open_circuit_then_fail_fast() {
    let provider = Arc::new(MockProvider::hanging());
    let pipeline = pipeline(config(1, 0), provider.clone());

    for i in 0..5 {
        let result = pipeline
            .triage(TicketInput::new(format!("{} #{}", TICKET, i), "alice"))
            .await
            .unwrap();
        assert!(!result.metadata.success);
    }
    assert_eq!(pipeline.breaker().state(), CircuitState::Open);
    assert_eq!(pipeline.health().status, HealthStatus::Degraded);

    // Open: rejected immediately, no provider call, no waiting
    let started = tokio::time::Instant::now();
    let result = pipeline
        .triage(TicketInput::new("another ticket", "alice"))
        .await
        .unwrap();
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(result.summary, "Automated triage unavailable: circuit open");
    assert_eq!(provider.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_after_cooldown() {
    let provider = Arc::new(
        MockProvider::new().with_script((0..5).map(|_| MockBehavior::Hang)),
    );
    let pipeline = pipeline(
        TriageConfig {
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 5,
                cooldown_seconds: 60,
            },
            ..config(1, 0)
        },
        provider.clone(),
    );

    for i in 0..5 {
        pipeline
            .triage(TicketInput::new(format!("ticket {}", i), "alice"))
            .await
            .unwrap();
    }
    assert_eq!(pipeline.breaker().state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_secs(59)).await;
    let still_open = pipeline
        .triage(TicketInput::new("during cooldown", "alice"))
        .await
        .unwrap();
    assert!(!still_open.metadata.success);
    assert_eq!(provider.calls(), 5);

    // Past the deadline: one trial call runs, succeeds, and closes the circuit
    tokio::time::sleep(Duration::from_secs(1)).await;
    let recovered = pipeline
        .triage(TicketInput::new("after cooldown", "alice"))
        .await
        .unwrap();
    assert!(recovered.metadata.success);
    assert_eq!(provider.calls(), 6);
    assert_eq!(pipeline.breaker().state(), CircuitState::Closed);
    assert_eq!(pipeline.health().status, HealthStatus::Ok);
}
