//! Shared fixtures for the integration scenarios.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use peernet::{
    AddressBook, BindEndpoint, ConnectionId, Endpoint, ListenConfig, NetConfig, NetService,
    ProtocolHandler,
};

/// Handler that records every callback for later assertions.
#[derive(Default)]
pub struct RecordingHandler {
    pub frames: Mutex<Vec<(ConnectionId, Vec<u8>)>>,
    pub finalized: Mutex<Vec<ConnectionId>>,
}

#[async_trait]
impl ProtocolHandler for RecordingHandler {
    async fn process_inbound(&self, id: ConnectionId, payload: &[u8]) -> bool {
        self.frames.lock().push((id, payload.to_vec()));
        false
    }

    async fn finalize(&self, id: ConnectionId) {
        self.finalized.lock().push(id);
    }

    fn has_outbound_work(&self, _id: ConnectionId) -> bool {
        false
    }
}

impl RecordingHandler {
    /// The connection that delivered `payload`, if any frame matched.
    pub fn frame_with_payload(&self, payload: &[u8]) -> Option<ConnectionId> {
        self.frames
            .lock()
            .iter()
            .find(|(_, p)| p.as_slice() == payload)
            .map(|(id, _)| *id)
    }
}

/// Test config listening on a loopback OS-assigned port.
pub fn listening_config() -> NetConfig {
    let mut config = NetConfig::for_testing();
    config.listen = ListenConfig {
        enabled: true,
        bind: vec![BindEndpoint::plain(Endpoint::new(
            "127.0.0.1".parse().unwrap(),
            0,
        ))],
        port: 0,
        backlog: 16,
    };
    config
}

/// Starts a service backed by a fresh, empty address book.
pub async fn start(config: NetConfig, handler: Arc<dyn ProtocolHandler>) -> NetService {
    NetService::start(config, handler, Arc::new(AddressBook::new()))
        .await
        .expect("service start")
}

/// Polls until `predicate` holds; panics after five seconds.
pub async fn wait_until<F: Fn() -> bool>(predicate: F, what: &str) {
    for _ in 0..1000 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
