//! Shutdown ordering observed from outside the service.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use peernet::{ConnectionId, NetError};
    use tokio::net::TcpStream;

    use crate::integration::support::{listening_config, start, wait_until, RecordingHandler};

    #[tokio::test]
    async fn test_stop_finalizes_every_peer() {
        let handler = Arc::new(RecordingHandler::default());
        let service = start(listening_config(), handler.clone()).await;
        let target = service.listen_endpoints()[0].to_socket_addr();

        let _a = TcpStream::connect(target).await.unwrap();
        let _b = TcpStream::connect(target).await.unwrap();
        wait_until(
            || service.control().stats().counts.inbound == 2,
            "both peers admitted",
        )
        .await;

        service.stop().await;

        let stats = service.control().stats();
        assert_eq!(stats.counts.active_total(), 0);
        assert_eq!(stats.counts.draining, 0);
        assert_eq!(stats.total_destroyed, 2);
        assert!(stats.sockets_closed >= 2);

        let finalized = handler.finalized.lock();
        assert_eq!(finalized.len(), 2, "each peer finalized exactly once");
        assert_ne!(finalized[0], finalized[1]);
    }

    #[tokio::test]
    async fn test_stopped_service_rejects_new_work_and_restop() {
        let service = start(listening_config(), Arc::new(RecordingHandler::default())).await;
        service.stop().await;

        let outcome = service.control().send_message(ConnectionId(1), vec![1]);
        assert!(matches!(outcome, Err(NetError::MessageProcessingStopped)));

        // A second stop must return without touching anything.
        service.stop().await;
    }
}
