//! Two live services exchanging frames over loopback.
//!
//! One service listens, the other reaches it through a manual target. The
//! scenario walks the full happy path: dial, admission, frame delivery in
//! both directions, counters, and a server-initiated disconnect observed
//! from both ends.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use peernet::{ConnectionClass, DisconnectReason, NetConfig};

    use crate::integration::support::{listening_config, start, wait_until, RecordingHandler};

    #[tokio::test]
    async fn test_two_services_exchange_frames_and_finalize() {
        let server_handler = Arc::new(RecordingHandler::default());
        let server = start(listening_config(), server_handler.clone()).await;
        let server_addr = server.listen_endpoints()[0];

        let client_handler = Arc::new(RecordingHandler::default());
        let mut client_config = NetConfig::for_testing();
        client_config.manual_targets = vec![server_addr];
        let client = start(client_config, client_handler.clone()).await;

        // The manual flow dials the server; both sides register the peer.
        wait_until(
            || !client.control().peers().is_empty(),
            "client outbound registration",
        )
        .await;
        wait_until(
            || server.control().stats().counts.inbound == 1,
            "server inbound admission",
        )
        .await;

        let outbound = client.control().peers()[0].clone();
        assert_eq!(outbound.class, ConnectionClass::Manual);
        assert_eq!(outbound.endpoint, server_addr);

        // Client to server.
        client
            .control()
            .send_message(outbound.id, b"hello".to_vec())
            .unwrap();
        wait_until(
            || server_handler.frame_with_payload(b"hello").is_some(),
            "server frame delivery",
        )
        .await;

        // Server to client, addressed by the id the inbound frame carried.
        let inbound_id = server_handler.frame_with_payload(b"hello").unwrap();
        server
            .control()
            .send_message(inbound_id, b"world".to_vec())
            .unwrap();
        wait_until(
            || client_handler.frame_with_payload(b"world") == Some(outbound.id),
            "client frame delivery",
        )
        .await;

        // Each 5-byte payload travels inside a 9-byte frame.
        let sent = client
            .control()
            .peers()
            .into_iter()
            .find(|p| p.id == outbound.id)
            .map(|p| (p.bytes_sent, p.bytes_received))
            .unwrap();
        assert!(sent.0 >= 9, "outbound frame counted, got {}", sent.0);
        assert!(sent.1 >= 9, "inbound frame counted, got {}", sent.1);

        // A server-side disconnect finalizes there and surfaces on the
        // client as a remote close.
        assert!(server
            .control()
            .disconnect_peer(inbound_id, DisconnectReason::Requested));
        wait_until(
            || server_handler.finalized.lock().contains(&inbound_id),
            "server finalization",
        )
        .await;
        wait_until(
            || client_handler.finalized.lock().contains(&outbound.id),
            "client finalization after remote close",
        )
        .await;

        client.stop().await;
        server.stop().await;
    }
}
