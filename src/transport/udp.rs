//! UDP transport for DNS queries.
//!
//! One receive loop reads datagrams and spawns a task per query; each task
//! resolves and sends its reply straight back to the client. Replies too
//! large for the client's advertised payload are truncated with TC set.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{MAX_DNS_PACKET_SIZE, Protocol, handle};
use crate::resolver::Resolver;

/// UDP listener feeding the resolver.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket on `addr`.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop.
    pub fn start(self, resolver: Arc<Resolver>) -> JoinHandle<()> {
        tokio::spawn(run(self.socket, resolver))
    }
}

async fn run(socket: Arc<UdpSocket>, resolver: Arc<Resolver>) {
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "udp recv error");
                continue;
            }
        };

        let packet = buf[..len].to_vec();
        let socket = socket.clone();
        let resolver = resolver.clone();

        tokio::spawn(async move {
            let Some(reply) = handle(&resolver, &packet, Protocol::Udp).await else {
                debug!(client = %src, len, "dropping undersized udp packet");
                return;
            };
            if let Err(e) = socket.send_to(&reply, src).await {
                warn!(client = %src, error = %e, "udp send error");
            }
        });
    }
}
