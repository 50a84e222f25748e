//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use hyper::{Request, Response, StatusCode};
use parking_lot::Mutex;

use mesh_dispatch::discovery::{DiscoveryError, InstanceCatalog, InstanceSnapshot, ServiceInstance};
use mesh_dispatch::http::{Body, HttpClientError, ResponseStream, Transport};

/// Catalog returning a fixed list, or a fixed failure.
pub struct MockCatalog {
    result: Result<InstanceSnapshot, DiscoveryError>,
    calls: Mutex<usize>,
}

impl MockCatalog {
    pub fn with_hosts(service: &str, hosts: &[&str]) -> Self {
        let instances = hosts
            .iter()
            .map(|h| ServiceInstance::new(service, "http", *h, Some(8080)))
            .collect();
        Self {
            result: Ok(instances),
            calls: Mutex::new(0),
        }
    }

    pub fn failing(error: DiscoveryError) -> Self {
        Self {
            result: Err(error),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl InstanceCatalog for MockCatalog {
    fn get_instances<'a>(
        &'a self,
        _service: &'a str,
    ) -> BoxFuture<'a, Result<InstanceSnapshot, DiscoveryError>> {
        *self.calls.lock() += 1;
        future::ready(self.result.clone()).boxed()
    }
}

/// Transport answering every request with one fixed status.
/// Error statuses are reported as `HttpClientError::Response`.
pub struct RecordingTransport {
    status: StatusCode,
    requests: Mutex<Vec<Request<Body>>>,
}

impl RecordingTransport {
    pub fn new(status: StatusCode) -> Arc<Self> {
        Arc::new(Self {
            status,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// URIs of the requests sent so far.
    pub fn uris(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.uri().to_string()).collect()
    }

    pub fn header(&self, index: usize, name: &str) -> Option<String> {
        self.requests.lock()[index]
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn sent(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Transport for RecordingTransport {
    fn exchange(&self, request: Request<Body>) -> ResponseStream {
        self.requests.lock().push(request);

        let mut response = Response::new(b"{}".to_vec());
        *response.status_mut() = self.status;

        let item = if self.status.is_client_error() || self.status.is_server_error() {
            Err(HttpClientError::from_response(response))
        } else {
            Ok(response)
        };
        stream::iter(vec![item]).boxed()
    }
}
