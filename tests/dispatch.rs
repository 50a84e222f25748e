//! End-to-end dispatch tests: selection, rewriting, and span lifecycle.

use std::sync::Arc;

use hyper::{Method, StatusCode};

use mesh_dispatch::discovery::DiscoveryError;
use mesh_dispatch::http::client::{TAG_ERROR, TAG_HTTP_CLIENT, TAG_HTTP_STATUS};
use mesh_dispatch::http::{ClientDispatcher, DispatchError, HttpClientError, OutboundRequest};
use mesh_dispatch::load_balancer::registry::LoadBalancerRegistry;
use mesh_dispatch::load_balancer::LoadBalancerError;
use mesh_dispatch::trace::{
    in_span, InMemoryReporter, Outcome, TagValue, TraceContext, Tracer, W3cTracer, TRACEPARENT,
};

mod common;

use common::{MockCatalog, RecordingTransport};

struct Harness {
    dispatcher: ClientDispatcher,
    transport: Arc<RecordingTransport>,
    reporter: Arc<InMemoryReporter>,
    tracer: Arc<W3cTracer>,
}

fn harness(catalog: MockCatalog, status: StatusCode) -> Harness {
    let registry = Arc::new(LoadBalancerRegistry::new(Arc::new(catalog)));
    let transport = RecordingTransport::new(status);
    let reporter = Arc::new(InMemoryReporter::new());
    let tracer = Arc::new(W3cTracer::new("checkout", reporter.clone()));
    let dispatcher = ClientDispatcher::new(registry, transport.clone(), tracer.clone());
    Harness {
        dispatcher,
        transport,
        reporter,
        tracer,
    }
}

fn get(path: &str) -> OutboundRequest {
    OutboundRequest::build(Method::GET, path).unwrap()
}

#[tokio::test]
async fn test_round_robin_across_instances() {
    let h = harness(MockCatalog::with_hosts("users", &["a", "b", "c"]), StatusCode::OK);

    for _ in 0..4 {
        h.dispatcher.exchange("users", get("/users/1"), None).await.unwrap();
    }

    assert_eq!(
        h.transport.uris(),
        vec![
            "http://a:8080/users/1",
            "http://b:8080/users/1",
            "http://c:8080/users/1",
            "http://a:8080/users/1",
        ]
    );
    assert_eq!(h.reporter.len(), 4);
}

#[tokio::test]
async fn test_empty_catalog_fails_without_sending() {
    let h = harness(MockCatalog::with_hosts("users", &[]), StatusCode::OK);

    let err = h.dispatcher.exchange("users", get("/"), None).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Selection(LoadBalancerError::NoInstancesAvailable { ref service }) if service == "users"
    ));
    assert_eq!(h.transport.sent(), 0);
    assert!(h.reporter.is_empty());
}

#[tokio::test]
async fn test_discovery_failure_propagates() {
    let failure = DiscoveryError::Unavailable {
        service: "users".into(),
        reason: "timeout".into(),
    };
    let h = harness(MockCatalog::failing(failure.clone()), StatusCode::OK);

    let err = h.dispatcher.exchange("users", get("/"), None).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Selection(LoadBalancerError::Discovery(ref e)) if *e == failure
    ));
}

#[tokio::test]
async fn test_success_span_and_propagation() {
    let h = harness(MockCatalog::with_hosts("users", &["a"]), StatusCode::OK);
    let request = get("/users/7");

    let response = h
        .dispatcher
        .exchange("users", request.clone(), None)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let spans = h.reporter.spans();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.name, "GET /users/7");
    assert_eq!(span.outcome, Some(Outcome::Ok));
    assert_eq!(span.tag(TAG_HTTP_CLIENT), Some(&TagValue::Bool(true)));
    assert_eq!(span.tag(TAG_HTTP_STATUS), Some(&TagValue::Int(200)));

    // The context was on the wire before the call went out.
    let sent = h.transport.header(0, TRACEPARENT).unwrap();
    assert_eq!(TraceContext::from_traceparent(&sent), Some(span.context));

    // And is published on the request for local consumers.
    assert_eq!(request.current_span_context(), Some(span.context));
}

#[tokio::test]
async fn test_not_found_tags_error_and_forwards() {
    let h = harness(MockCatalog::with_hosts("users", &["a"]), StatusCode::NOT_FOUND);

    let err = h.dispatcher.exchange("users", get("/users/404"), None).await.unwrap_err();
    match &err {
        DispatchError::Request(HttpClientError::Response { response }) => {
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let spans = h.reporter.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].outcome, Some(Outcome::Error));
    assert_eq!(spans[0].tag(TAG_HTTP_STATUS), Some(&TagValue::Int(404)));
    assert_eq!(spans[0].tag(TAG_ERROR), Some(&TagValue::Bool(true)));
}

#[tokio::test]
async fn test_retrieve_optional_maps_not_found() {
    let h = harness(MockCatalog::with_hosts("users", &["a"]), StatusCode::NOT_FOUND);

    let result = h.dispatcher.retrieve_optional("users", get("/users/404"), None).await;
    assert!(matches!(result, Ok(None)));
    assert_eq!(h.reporter.spans()[0].outcome, Some(Outcome::Error));

    let failing = harness(MockCatalog::with_hosts("users", &["a"]), StatusCode::BAD_GATEWAY);
    let result = failing
        .dispatcher
        .retrieve_optional("users", get("/"), None)
        .await;
    assert_eq!(result.unwrap_err().status(), Some(StatusCode::BAD_GATEWAY));
}

#[tokio::test]
async fn test_parent_context() {
    let h = harness(MockCatalog::with_hosts("users", &["a"]), StatusCode::OK);

    let explicit = TraceContext::new_root();
    h.dispatcher
        .exchange("users", get("/"), Some(&explicit))
        .await
        .unwrap();

    let ambient = h.tracer.new_span("handler", None).start();
    in_span(
        ambient.clone(),
        h.dispatcher.exchange("users", get("/"), None),
    )
    .await
    .unwrap();

    let spans = h.reporter.spans();
    assert_eq!(spans[0].parent, Some(explicit));
    assert_eq!(spans[0].context.trace_id, explicit.trace_id);
    assert_eq!(spans[1].parent, Some(ambient.context()));
}

#[tokio::test]
async fn test_open_spans_when_not_finishing_on_close() {
    let h = harness(MockCatalog::with_hosts("users", &["a"]), StatusCode::OK);
    let dispatcher = h.dispatcher.finish_on_close(false);
    let request = get("/");

    dispatcher.exchange("users", request.clone(), None).await.unwrap();
    assert!(h.reporter.is_empty());

    let span = request.current_span().unwrap();
    assert_eq!(span.outcome(), Some(Outcome::Ok));
    assert!(span.finish());
    assert_eq!(h.reporter.len(), 1);
}

#[tokio::test]
async fn test_dispatch_is_lazy() {
    let h = harness(MockCatalog::with_hosts("users", &["a"]), StatusCode::OK);

    let responses = h.dispatcher.dispatch("users", get("/"), None).await.unwrap();
    assert_eq!(h.transport.sent(), 0);
    drop(responses);

    assert_eq!(h.transport.sent(), 0);
    assert!(h.reporter.is_empty());
}
