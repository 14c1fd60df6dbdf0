//! Resolver orchestration.
//!
//! Builds the resolver from a [`ServerConfig`], binds the transports, starts
//! the background tasks and runs until a listener stops.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::select_all;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cache::ResponseCache;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::filter::{HostAdder, Whitelist, new_store};
use crate::overrides::Override;
use crate::resolver::{Resolver, Zones};
use crate::transport::{tcp::TcpTransport, udp::UdpTransport};
use crate::upstream::Upstreams;

/// A bound, not yet running, resolver.
pub struct Server {
    resolver: Arc<Resolver>,
    blocker: Arc<dyn HostAdder>,
    udp: UdpTransport,
    tcp: TcpTransport,
    config: ServerConfig,
}

impl Server {
    /// Build every component and bind the listeners.
    ///
    /// Fails on invalid upstreams, an unresolvable DoH endpoint, a bad cache
    /// size or a listener that cannot bind.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let default = Upstreams::from_specs(&config.forward, config.https, config.timeouts).await?;
        let mut zones = Zones::new(default);
        for spec in &config.zones {
            let upstreams =
                Upstreams::from_specs(&spec.upstreams, config.https, config.timeouts).await?;
            zones.insert(&spec.zone, upstreams);
        }
        for (zone, upstreams) in zones.iter() {
            info!(zone, upstreams = %upstreams, "forwarding zone");
        }

        let blocker = new_store(config.block_store);
        let overrides = Override::new(config.overrides.iter().map(|o| (&o.host, &o.addrs)));

        let mut resolver = Resolver::new(zones, config.timeouts)
            .with_blocker(blocker.clone())
            .with_passer(Arc::new(Whitelist::new(&config.whitelist)))
            .with_overrides(overrides, config.override_ttl)
            .with_block_reply(config.block);

        if !config.no_cache {
            resolver = resolver.with_cache(Arc::new(ResponseCache::new(config.cache_size)?));
        }

        // TCP shares the UDP port so binding port 0 yields one address.
        let udp = UdpTransport::bind(config.listen).await?;
        let tcp = TcpTransport::bind(udp.local_addr()?, config.timeouts.client).await?;

        Ok(Self {
            resolver: Arc::new(resolver),
            blocker,
            udp,
            tcp,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    /// Start every task and serve until a listener exits.
    pub async fn run(self) -> Result<()> {
        let addr = self.local_addr()?;

        if let Some(cache) = self.resolver.cache() {
            cache.start(self.config.cache_prune_interval);
        }

        let feeders: Vec<JoinHandle<()>> = self
            .config
            .blocklists
            .iter()
            .cloned()
            .map(|list| list.watch(self.blocker.clone(), self.config.blocklist_interval))
            .collect();

        let stats = spawn_stats(self.resolver.clone(), self.config.stats_interval);
        let listeners = vec![
            self.udp.start(self.resolver.clone()),
            self.tcp.start(self.resolver.clone()),
        ];

        info!(
            listen = %addr,
            blocklists = feeders.len(),
            cache = !self.config.no_cache,
            "resolver listening"
        );

        let (result, _, _) = select_all(listeners).await;
        if let Err(e) = result {
            error!(error = %e, "listener task ended");
        }

        stats.abort();
        for feeder in feeders {
            feeder.abort();
        }
        if let Some(cache) = self.resolver.cache() {
            cache.stop();
        }
        Ok(())
    }
}

/// Run the resolver with the given configuration.
pub async fn run(config: ServerConfig) -> Result<()> {
    Server::bind(config).await?.run().await
}

/// Log a stats line every `interval`.
fn spawn_stats(resolver: Arc<Resolver>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = resolver.stats().snapshot_and_reset();
            let cache_len = resolver.cache().map(|cache| cache.len()).unwrap_or(0);
            info!(
                uptime_secs = stats.uptime_secs,
                requests = stats.requests,
                forwarded = stats.forwarded,
                cached = stats.cached,
                blocked = stats.blocked,
                overridden = stats.overridden,
                failed = stats.failed,
                avg_response_ms = format_args!("{:.2}", stats.avg_response_ms),
                cache = cache_len,
                blocked_hosts = resolver.blocked_count(),
                "stats"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData, RecordType};
    use std::str::FromStr;
    use tokio::net::UdpSocket;

    use crate::config::OverrideSpec;
    use crate::filter::{Blocklist, ListFormat};
    use crate::upstream::Timeouts;

    async fn ask(server: SocketAddr, name: &str) -> Message {
        let mut req = Message::new();
        req.set_id(55)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);
        req.add_query(Query::query(Name::from_str(name).unwrap(), RecordType::A));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&req.to_vec().unwrap(), server).await.unwrap();
        let mut buf = vec![0u8; 4096];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        Message::from_vec(&buf[..len]).unwrap()
    }

    fn config() -> ServerConfig {
        ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            forward: vec!["127.0.0.1:9".to_string()],
            timeouts: Timeouts {
                dial: Duration::from_millis(100),
                client: Duration::from_millis(100),
                lookup_interval: Duration::from_millis(20),
            },
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn bind_rejects_bad_forwarder() {
        let config = ServerConfig {
            forward: vec!["not-an-address".to_string()],
            ..config()
        };
        assert!(Server::bind(config).await.is_err());
    }

    #[tokio::test]
    async fn bind_rejects_zero_cache_size() {
        let config = ServerConfig {
            cache_size: 0,
            ..config()
        };
        assert!(Server::bind(config).await.is_err());
    }

    #[tokio::test]
    async fn server_serves_blocklist_and_overrides() {
        let path = std::env::temp_dir().join(format!("sinkhole-server-{}", std::process::id()));
        tokio::fs::write(&path, "0.0.0.0 ads.example.com\n").await.unwrap();

        let config = ServerConfig {
            overrides: vec![OverrideSpec {
                host: "nas.lan".into(),
                addrs: vec!["10.0.0.5".into()],
            }],
            blocklists: vec![Blocklist::new(&path, ListFormat::Hosts)],
            blocklist_interval: Duration::from_millis(20),
            ..config()
        };
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let running = tokio::spawn(server.run());

        let resp = ask(addr, "nas.lan.").await;
        assert_eq!(resp.answers()[0].data(), Some(&RData::A(A::new(10, 0, 0, 5))));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut blocked = None;
        for _ in 0..20 {
            let resp = ask(addr, "ads.example.com.").await;
            if resp.response_code() == ResponseCode::NoError && !resp.answers().is_empty() {
                blocked = Some(resp);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let blocked = blocked.expect("blocklist was never loaded");
        assert_eq!(blocked.answers()[0].data(), Some(&RData::A(A::new(127, 0, 0, 1))));
        assert_eq!(blocked.answers()[0].ttl(), 3600);

        running.abort();
        let _ = tokio::fs::remove_file(&path).await;
    }
}
