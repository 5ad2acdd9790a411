//! Dispatch-path behavior: passthrough, breaker supervision, and fallback
//! substitution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tower::{service_fn, Service, ServiceExt};
use tower_resilient_client::{
    shared, BreakerConfig, BreakerFactory, ClientDefinition, ClientError, FailureCause,
    FallbackFactory, LocalDecision, ScopeRegistry, SharedClient, TargetBuilder,
};

struct OrdersFallback;
struct OrdersFallbackFactory;

fn failing_target(calls: Arc<AtomicUsize>) -> SharedClient<String, String, String> {
    shared(service_fn(move |_req: String| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Err::<String, String>("boom".to_string()) }
    }))
}

fn echo_target() -> SharedClient<String, String, String> {
    shared(service_fn(|req: String| async move {
        Ok::<_, String>(format!("response: {req}"))
    }))
}

fn quick_breakers() -> BreakerFactory {
    BreakerFactory::new(
        BreakerConfig::builder()
            .failure_rate_threshold(0.5)
            .sliding_window_size(2)
            .minimum_number_of_calls(2)
            .wait_duration_in_open(Duration::from_secs(60))
            .build(),
    )
}

fn definition() -> ClientDefinition {
    ClientDefinition::builder().name("orders-service").build()
}

#[tokio::test]
async fn unguarded_dispatcher_passes_through() {
    let registry = ScopeRegistry::new();
    let builder = TargetBuilder::new(&registry);

    let mut dispatcher = builder.register(&definition(), echo_target()).unwrap();
    assert!(!dispatcher.is_guarded());

    let response = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-1".to_string())
        .await
        .unwrap();
    assert_eq!(response, "response: order-1");
}

#[tokio::test]
async fn unguarded_failure_surfaces_inner_error() {
    let registry = ScopeRegistry::new();
    let builder = TargetBuilder::new(&registry);

    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = builder
        .register(&definition(), failing_target(Arc::clone(&calls)))
        .unwrap();

    let result = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-1".to_string())
        .await;
    match result {
        Err(ClientError::Inner(error)) => assert_eq!(error, "boom"),
        other => panic!("expected inner error, got {other:?}"),
    }
}

#[tokio::test]
async fn primary_failure_propagates_without_fallback() {
    let registry = ScopeRegistry::new();
    let breakers = quick_breakers();
    let builder = TargetBuilder::new(&registry).with_breakers(&breakers);

    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = builder
        .register(&definition(), failing_target(Arc::clone(&calls)))
        .unwrap();
    assert!(dispatcher.is_guarded());

    let result = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-1".to_string())
        .await;
    match result {
        Err(ClientError::Inner(error)) => assert_eq!(error, "boom"),
        other => panic!("expected inner error, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn open_circuit_rejects_with_client_name() {
    let registry = ScopeRegistry::new();
    let breakers = quick_breakers();
    let builder = TargetBuilder::new(&registry).with_breakers(&breakers);

    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = builder
        .register(&definition(), failing_target(Arc::clone(&calls)))
        .unwrap();
    dispatcher.breaker().unwrap().force_open().await;

    let result = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-1".to_string())
        .await;
    match result {
        Err(error) => {
            assert!(error.is_circuit_open());
            assert!(error.to_string().contains("orders-service"));
        }
        Ok(_) => panic!("expected rejection"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repeated_failures_open_the_circuit() {
    let registry = ScopeRegistry::new();
    let breakers = quick_breakers();
    let builder = TargetBuilder::new(&registry).with_breakers(&breakers);

    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = builder
        .register(&definition(), failing_target(Arc::clone(&calls)))
        .unwrap();

    for _ in 0..2 {
        let result = dispatcher
            .ready()
            .await
            .unwrap()
            .call("order-1".to_string())
            .await;
        assert!(matches!(result, Err(ClientError::Inner(_))));
    }

    let result = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-1".to_string())
        .await;
    assert!(matches!(result, Err(ClientError::CircuitOpen { .. })));
    // The rejected call never reached the primary target.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn primary_failure_routes_to_fallback_instance() {
    let registry = ScopeRegistry::new();
    registry.bind::<OrdersFallback>(
        "orders-service",
        shared(service_fn(|req: String| async move {
            Ok::<_, String>(format!("cached: {req}"))
        })),
    );
    let breakers = quick_breakers();
    let builder = TargetBuilder::new(&registry).with_breakers(&breakers);

    let definition = ClientDefinition::builder()
        .name("orders-service")
        .fallback::<OrdersFallback>()
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = builder
        .register(&definition, failing_target(Arc::clone(&calls)))
        .unwrap();

    let response = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-1".to_string())
        .await
        .unwrap();
    assert_eq!(response, "cached: order-1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn open_circuit_routes_to_fallback_instance() {
    let registry = ScopeRegistry::new();
    registry.bind::<OrdersFallback>(
        "orders-service",
        shared(service_fn(|req: String| async move {
            Ok::<_, String>(format!("cached: {req}"))
        })),
    );
    let breakers = quick_breakers();
    let builder = TargetBuilder::new(&registry).with_breakers(&breakers);

    let definition = ClientDefinition::builder()
        .name("orders-service")
        .fallback::<OrdersFallback>()
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = builder
        .register(&definition, failing_target(Arc::clone(&calls)))
        .unwrap();
    dispatcher.breaker().unwrap().force_open().await;

    let response = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-7".to_string())
        .await
        .unwrap();
    assert_eq!(response, "cached: order-7");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_fallback_surfaces_as_fallback_failed() {
    let registry = ScopeRegistry::new();
    registry.bind::<OrdersFallback>(
        "orders-service",
        shared(service_fn(|_req: String| async move {
            Err::<String, String>("fallback broken".to_string())
        })),
    );
    let breakers = quick_breakers();
    let builder = TargetBuilder::new(&registry).with_breakers(&breakers);

    let definition = ClientDefinition::builder()
        .name("orders-service")
        .fallback::<OrdersFallback>()
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = builder
        .register(&definition, failing_target(Arc::clone(&calls)))
        .unwrap();

    let result = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-1".to_string())
        .await;
    match result {
        Err(error) => {
            assert!(error.is_fallback_failed());
            assert_eq!(error.into_inner(), Some("fallback broken".to_string()));
        }
        Ok(_) => panic!("expected fallback failure"),
    }
}

fn cause_reporting_factory() -> FallbackFactory<String, String, String> {
    FallbackFactory::new(|cause: &FailureCause<String>| {
        let label = match cause {
            FailureCause::CircuitOpen => "circuit open".to_string(),
            FailureCause::Failure(error) => format!("cause: {error}"),
        };
        shared(service_fn(move |_req: String| {
            let label = label.clone();
            async move { Ok::<_, String>(label) }
        }))
    })
}

#[tokio::test]
async fn factory_fallback_sees_the_primary_failure() {
    let registry = ScopeRegistry::new();
    registry.bind::<OrdersFallbackFactory>("orders-service", cause_reporting_factory());
    let breakers = quick_breakers();
    let builder = TargetBuilder::new(&registry).with_breakers(&breakers);

    let definition = ClientDefinition::builder()
        .name("orders-service")
        .fallback_factory::<OrdersFallbackFactory>()
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = builder
        .register(&definition, failing_target(Arc::clone(&calls)))
        .unwrap();

    let response = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-1".to_string())
        .await
        .unwrap();
    assert_eq!(response, "cause: boom");
}

#[tokio::test]
async fn factory_fallback_sees_breaker_rejection() {
    let registry = ScopeRegistry::new();
    registry.bind::<OrdersFallbackFactory>("orders-service", cause_reporting_factory());
    let breakers = quick_breakers();
    let builder = TargetBuilder::new(&registry).with_breakers(&breakers);

    let definition = ClientDefinition::builder()
        .name("orders-service")
        .fallback_factory::<OrdersFallbackFactory>()
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = builder
        .register(&definition, failing_target(Arc::clone(&calls)))
        .unwrap();
    dispatcher.breaker().unwrap().force_open().await;

    let response = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-1".to_string())
        .await
        .unwrap();
    assert_eq!(response, "circuit open");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn local_requests_bypass_breaker_and_fallback() {
    let registry = ScopeRegistry::new();
    registry.bind::<OrdersFallback>(
        "orders-service",
        shared(service_fn(|req: String| async move {
            Ok::<_, String>(format!("cached: {req}"))
        })),
    );
    let breakers = quick_breakers();
    let builder = TargetBuilder::new(&registry).with_breakers(&breakers);

    let definition = ClientDefinition::builder()
        .name("orders-service")
        .fallback::<OrdersFallback>()
        .build();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = builder
        .register(&definition, failing_target(Arc::clone(&calls)))
        .unwrap()
        .with_local_handler(|req: String| {
            if req == "ping" {
                LocalDecision::Handled(Box::pin(async {
                    Ok::<_, String>("pong".to_string())
                }))
            } else {
                LocalDecision::Forward(req)
            }
        });
    dispatcher.breaker().unwrap().force_open().await;

    // The built-in request is answered even with the circuit open, and
    // neither the primary target nor the fallback sees it.
    let response = dispatcher
        .ready()
        .await
        .unwrap()
        .call("ping".to_string())
        .await
        .unwrap();
    assert_eq!(response, "pong");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Forwarded requests still take the guarded path.
    let response = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-1".to_string())
        .await
        .unwrap();
    assert_eq!(response, "cached: order-1");
}

#[tokio::test]
async fn breaker_event_hooks_observe_the_dispatch_path() {
    let transitions = Arc::new(AtomicUsize::new(0));
    let rejections = Arc::new(AtomicUsize::new(0));
    let transitions_seen = Arc::clone(&transitions);
    let rejections_seen = Arc::clone(&rejections);

    let registry = ScopeRegistry::new();
    let breakers = BreakerFactory::new(
        BreakerConfig::builder()
            .failure_rate_threshold(0.5)
            .sliding_window_size(2)
            .minimum_number_of_calls(2)
            .wait_duration_in_open(Duration::from_secs(60))
            .on_state_transition(move |_from, _to| {
                transitions_seen.fetch_add(1, Ordering::SeqCst);
            })
            .on_call_rejected(move || {
                rejections_seen.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
    );
    let builder = TargetBuilder::new(&registry).with_breakers(&breakers);

    let calls = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = builder
        .register(&definition(), failing_target(Arc::clone(&calls)))
        .unwrap();

    for _ in 0..2 {
        let _ = dispatcher
            .ready()
            .await
            .unwrap()
            .call("order-1".to_string())
            .await;
    }
    let _ = dispatcher
        .ready()
        .await
        .unwrap()
        .call("order-1".to_string())
        .await;

    assert_eq!(transitions.load(Ordering::SeqCst), 1);
    assert_eq!(rejections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn clones_dispatch_concurrently() {
    let registry = ScopeRegistry::new();
    let breakers = BreakerFactory::with_defaults();
    let builder = TargetBuilder::new(&registry).with_breakers(&breakers);

    let dispatcher = builder.register(&definition(), echo_target()).unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let clone = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            clone.oneshot(format!("order-{i}")).await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }
}
