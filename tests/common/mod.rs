//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use guardrail::ordering::{InMemoryOrderStore, OrderableEntity};
use guardrail::{GuardConfig, HttpServer, Shutdown};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<InMemoryOrderStore>,
    pub shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.handle.await;
    }
}

pub fn entity(id: u64, owner: &str, order: i32, version: u32) -> OrderableEntity {
    OrderableEntity {
        id,
        owner_id: owner.to_string(),
        display_order: order,
        version,
    }
}

/// Boot the guard on an ephemeral port with `rows` preloaded in its order store.
pub async fn spawn_server(config: GuardConfig, rows: Vec<OrderableEntity>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let store: Arc<InMemoryOrderStore> = Arc::new(rows.into_iter().collect());
    let server = HttpServer::with_store(config, store.clone());

    let shutdown = Shutdown::new();
    let task_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        let (_updates_tx, updates) = mpsc::unbounded_channel();
        server.run(listener, updates, &task_shutdown).await.unwrap();
    });

    TestServer {
        addr,
        store,
        shutdown,
        handle,
    }
}
