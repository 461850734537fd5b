//! Inbound caps and eviction under connection pressure.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use peernet::{NoOpProtocolHandler, PermissionFlags};
    use tokio::net::TcpStream;

    use crate::integration::support::{listening_config, start, wait_until};

    #[tokio::test]
    async fn test_inbound_overflow_evicts_rather_than_grows() {
        let config = listening_config();
        let cap = config.limits.max_inbound;
        let service = start(config, Arc::new(NoOpProtocolHandler)).await;
        let target = service.listen_endpoints()[0].to_socket_addr();

        // One connection more than the pool admits. The streams stay alive
        // so only eviction can free a slot.
        let mut clients = Vec::new();
        for _ in 0..cap + 1 {
            clients.push(TcpStream::connect(target).await.unwrap());
        }

        wait_until(
            || service.control().stats().total_accepted == (cap + 1) as u64,
            "every connection admitted",
        )
        .await;
        wait_until(
            || {
                let stats = service.control().stats();
                stats.counts.inbound == cap && stats.total_evicted == 1
            },
            "pool settled at the cap after one eviction",
        )
        .await;

        drop(clients);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_no_ban_peers_are_never_evicted() {
        let mut config = listening_config();
        config.listen.bind[0].permissions = PermissionFlags {
            no_ban: true,
            force_relay: false,
        };
        let cap = config.limits.max_inbound;
        let service = start(config, Arc::new(NoOpProtocolHandler)).await;
        let target = service.listen_endpoints()[0].to_socket_addr();

        let mut clients = Vec::new();
        for _ in 0..cap {
            clients.push(TcpStream::connect(target).await.unwrap());
        }
        wait_until(
            || service.control().stats().counts.inbound == cap,
            "pool filled with protected peers",
        )
        .await;

        // With every slot protected there is no victim, so the extra
        // connection is refused outright.
        let _extra = TcpStream::connect(target).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let stats = service.control().stats();
        assert_eq!(stats.counts.inbound, cap);
        assert_eq!(stats.total_accepted, cap as u64);
        assert_eq!(stats.total_evicted, 0);

        drop(clients);
        service.stop().await;
    }
}
