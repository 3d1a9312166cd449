//! Shared harness for hub integration tests.
//!
//! Spawns a real `HubServer` on an ephemeral port, pointed at whatever
//! handler URLs the test supplies (mock handlers, wiremock servers, or
//! closed ports).

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use messagehub::config::HubConfig;
use messagehub::mock::{MockHandler, MockHandlerHandle};
use messagehub::transport::server::HubServer;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running hub. Dropping it stops the server.
pub struct TestHub {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestHub {
    /// Start a hub with `config` (its listen address is ignored).
    pub async fn start(config: HubConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind hub listener");
        let addr = listener.local_addr().expect("should have local addr");

        let server = HubServer::from_config(&config).expect("should build hub server");
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            let _ = server.serve(listener, token).await;
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            shutdown,
            _handle: handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// POST a raw body to `path`.
    pub async fn post_raw(&self, path: &str, body: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("hub request should complete")
    }

    /// POST a JSON value to `path`.
    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("hub request should complete")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("hub request should complete")
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Both mock handlers plus a hub routed at them.
pub struct TestStack {
    pub hub: TestHub,
    pub order: MockHandlerHandle,
    pub payment: MockHandlerHandle,
}

/// Start zero-latency Order and Payment mocks and a hub in front of them.
pub async fn start_stack() -> TestStack {
    start_stack_with(MockHandler::order(), MockHandler::payment()).await
}

/// Start the given mocks and a hub in front of them.
pub async fn start_stack_with(order: MockHandler, payment: MockHandler) -> TestStack {
    let order = order.start().await.expect("should start order mock");
    let payment = payment.start().await.expect("should start payment mock");
    let config = HubConfig::with_handler_urls(order.url(), payment.url());
    let hub = TestHub::start(config).await;

    TestStack {
        hub,
        order,
        payment,
    }
}

/// A base URL nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind scratch listener");
    let addr = listener.local_addr().expect("should have local addr");
    drop(listener);
    format!("http://{addr}")
}

/// Default timeout for tests that exercise slow handlers.
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(300);
