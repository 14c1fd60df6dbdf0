//! Plain DNS over UDP and TCP.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use hickory_proto::op::{Message, ResponseCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

use super::{Timeouts, log_unusable};
use crate::error::{Error, Result};
use crate::transport::Protocol;

/// Largest UDP datagram accepted from an upstream.
const MAX_UDP_RESPONSE: usize = 65_535;

/// One race attempt: exchange `req` with `server`, treating any failure or a
/// SERVFAIL answer as unusable.
pub(super) async fn attempt(
    server: SocketAddr,
    req: &Message,
    protocol: Protocol,
    timeouts: Timeouts,
) -> Option<Message> {
    let upstream = server.to_string();
    debug!(upstream = %upstream, protocol = %protocol, "upstream attempt");
    match exchange(server, req, protocol, timeouts).await {
        Ok(resp) if resp.response_code() == ResponseCode::ServFail => {
            log_unusable(&upstream, &Error::ServerFailure(upstream.clone()));
            None
        }
        Ok(resp) => {
            let rcode = resp.response_code();
            if rcode != ResponseCode::NoError && rcode != ResponseCode::NXDomain {
                debug!(upstream = %upstream, rcode = %rcode, "upstream returned an error answer");
            }
            Some(resp)
        }
        Err(e) => {
            log_unusable(&upstream, &e);
            None
        }
    }
}

/// Send `req` to `server` and wait for the matching reply.
///
/// The exchange runs over `protocol`; a truncated UDP reply is retried over
/// TCP. The reply carries `req`'s id.
pub async fn exchange(
    server: SocketAddr,
    req: &Message,
    protocol: Protocol,
    timeouts: Timeouts,
) -> Result<Message> {
    let mut query = req.clone();
    let id = rand::random::<u16>();
    query.set_id(id);
    let bytes = query.to_vec()?;

    let mut resp = match protocol {
        Protocol::Udp => {
            let resp = exchange_udp(server, &bytes, id, timeouts).await?;
            if resp.truncated() {
                debug!(upstream = %server, "truncated udp answer, retrying over tcp");
                exchange_tcp(server, &bytes, id, timeouts).await?
            } else {
                resp
            }
        }
        Protocol::Tcp => exchange_tcp(server, &bytes, id, timeouts).await?,
    };

    resp.set_id(req.id());
    Ok(resp)
}

async fn exchange_udp(
    server: SocketAddr,
    query: &[u8],
    id: u16,
    timeouts: Timeouts,
) -> Result<Message> {
    let local: SocketAddr = match server {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(server).await?;

    timeout(timeouts.client, socket.send(query))
        .await
        .map_err(|_| Error::Timeout(server.to_string()))??;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE];
    loop {
        let len = timeout(timeouts.client, socket.recv(&mut buf))
            .await
            .map_err(|_| Error::Timeout(server.to_string()))??;

        // stray datagrams with another id are ignored
        match Message::from_vec(&buf[..len]) {
            Ok(resp) if resp.id() == id => return Ok(resp),
            Ok(_) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

async fn exchange_tcp(
    server: SocketAddr,
    query: &[u8],
    id: u16,
    timeouts: Timeouts,
) -> Result<Message> {
    let mut stream = timeout(timeouts.dial, TcpStream::connect(server))
        .await
        .map_err(|_| Error::Timeout(server.to_string()))??;

    let len = u16::try_from(query.len())
        .map_err(|_| Error::InvalidUpstream("query too large for tcp".into()))?;
    let mut framed = Vec::with_capacity(query.len() + 2);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(query);

    timeout(timeouts.client, stream.write_all(&framed))
        .await
        .map_err(|_| Error::Timeout(server.to_string()))??;

    let resp = timeout(timeouts.client, read_framed(&mut stream))
        .await
        .map_err(|_| Error::Timeout(server.to_string()))??;

    let resp = Message::from_vec(&resp)?;
    if resp.id() != id {
        return Err(Error::ServerFailure(server.to_string()));
    }
    Ok(resp)
}

/// Read one length-prefixed DNS message.
pub(crate) async fn read_framed<S>(stream: &mut S) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let len = stream.read_u16().await? as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}
