//! Block-relay anchor capture at shutdown and redial at the next start.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;

    use peernet::adapters::persist::ANCHORS_FILE;
    use peernet::{
        AddressBook, AddressProvenance, AddressSource, ConnectionClass, Endpoint, NetConfig,
        NetService, NoOpProtocolHandler,
    };
    use tokio::net::TcpListener;

    use crate::integration::support::wait_until;

    fn outbound_config(data_dir: PathBuf) -> NetConfig {
        let mut config = NetConfig::for_testing();
        config.limits.max_outbound_full = 1;
        config.limits.max_outbound_block_relay = 1;
        config.data_dir = Some(data_dir);
        config
    }

    #[tokio::test]
    async fn test_anchor_captured_then_redialed_on_restart() {
        let first_dir = tempfile::tempdir().unwrap();
        let second_dir = tempfile::tempdir().unwrap();

        // Plain listeners standing in for remote peers. Their kernels accept
        // the dials; no service runs behind them.
        let peer_a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer_b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr_a = Endpoint::from(peer_a.local_addr().unwrap());
        let addr_b = Endpoint::from(peer_b.local_addr().unwrap());

        // First run: both relay slots fill from the address book.
        let book = Arc::new(AddressBook::new());
        book.add(&[addr_a, addr_b], AddressProvenance::Manual);
        let service = NetService::start(
            outbound_config(first_dir.path().to_path_buf()),
            Arc::new(NoOpProtocolHandler),
            book as Arc<dyn AddressSource>,
        )
        .await
        .unwrap();

        wait_until(
            || {
                let counts = service.control().stats().counts;
                counts.outbound_full == 1 && counts.outbound_block_relay == 1
            },
            "relay slots filled",
        )
        .await;

        // Only handshaken block-relay peers qualify as anchors.
        let block_peer = service
            .control()
            .peers()
            .into_iter()
            .find(|p| p.class == ConnectionClass::OutboundBlockOnly)
            .unwrap();
        service.control().mark_handshake_complete(block_peer.id);
        wait_until(
            || service.control().stats().handshaken_relay_outbound >= 1,
            "handshake recorded",
        )
        .await;

        service.stop().await;
        let anchors_path = first_dir.path().join(ANCHORS_FILE);
        assert!(anchors_path.exists(), "anchors written at shutdown");

        // Second run: a directory holding only the anchors file, fed by an
        // empty address book. The only address the service can possibly dial
        // is the anchor.
        fs::copy(&anchors_path, second_dir.path().join(ANCHORS_FILE)).unwrap();
        let service = NetService::start(
            outbound_config(second_dir.path().to_path_buf()),
            Arc::new(NoOpProtocolHandler),
            Arc::new(AddressBook::new()) as Arc<dyn AddressSource>,
        )
        .await
        .unwrap();

        // Anchors are consumed by reading: the file is already gone even
        // though the redial may still be in flight.
        assert!(!second_dir.path().join(ANCHORS_FILE).exists());

        wait_until(
            || {
                service.control().peers().iter().any(|p| {
                    p.class == ConnectionClass::OutboundBlockOnly
                        && p.endpoint == block_peer.endpoint
                })
            },
            "anchor redialed as block-relay",
        )
        .await;
        assert_eq!(service.control().stats().counts.outbound_full, 0);

        service.stop().await;
    }
}
