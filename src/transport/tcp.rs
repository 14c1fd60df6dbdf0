//! TCP transport for DNS queries.
//!
//! Each client connection is handled in its own task. Messages are prefixed
//! with a 2-byte length; a connection may carry several queries in a row and
//! is closed after a read error, EOF or the idle timeout.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{Protocol, handle};
use crate::resolver::Resolver;
use crate::upstream::read_framed;

/// TCP listener feeding the resolver.
pub struct TcpTransport {
    listener: TcpListener,
    idle_timeout: Duration,
}

impl TcpTransport {
    /// Bind a TCP listener on `addr`. Connections idle for longer than
    /// `idle_timeout` between queries are closed.
    pub async fn bind(addr: SocketAddr, idle_timeout: Duration) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, idle_timeout })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start the accept loop.
    pub fn start(self, resolver: Arc<Resolver>) -> JoinHandle<()> {
        tokio::spawn(run_accept_loop(self.listener, resolver, self.idle_timeout))
    }
}

async fn run_accept_loop(listener: TcpListener, resolver: Arc<Resolver>, idle_timeout: Duration) {
    loop {
        match listener.accept().await {
            Ok((client, peer)) => {
                tokio::spawn(handle_connection(client, peer, resolver.clone(), idle_timeout));
            }
            Err(e) => {
                warn!(error = %e, "tcp accept error");
            }
        }
    }
}

async fn handle_connection(
    mut client: TcpStream,
    peer: SocketAddr,
    resolver: Arc<Resolver>,
    idle_timeout: Duration,
) {
    loop {
        let query = match timeout(idle_timeout, read_framed(&mut client)).await {
            Ok(Ok(query)) => query,
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => return,
            Ok(Err(e)) => {
                debug!(client = %peer, error = %e, "tcp read error");
                return;
            }
            Err(_) => return,
        };

        let Some(reply) = handle(&resolver, &query, Protocol::Tcp).await else {
            return;
        };
        let Ok(len) = u16::try_from(reply.len()) else {
            warn!(client = %peer, len = reply.len(), "tcp reply too large");
            return;
        };

        let mut framed = Vec::with_capacity(reply.len() + 2);
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(&reply);
        if let Err(e) = client.write_all(&framed).await {
            debug!(client = %peer, error = %e, "tcp write error");
            return;
        }
    }
}
