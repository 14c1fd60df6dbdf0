//! Transport layer implementations for the resolver.
//!
//! Provides UDP and TCP listeners that decode client queries, hand them to
//! the [`Resolver`] and write the reply back. Each query runs in its own task.

pub mod tcp;
pub mod udp;

use std::fmt;
use std::time::{Duration, Instant};

use hickory_proto::op::{Message, MessageType, ResponseCode};
use tracing::{debug, error, info, warn};

use crate::dns::{encode_udp, max_udp_payload};
use crate::resolver::{Outcome, Resolution, Resolver};

/// Size of the receive buffer for client datagrams.
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

/// Length of the fixed DNS header.
const HEADER_LEN: usize = 12;

/// Transport protocol a query arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logger for DNS query events.
///
/// Failures log at `error`, blocked queries at `warn`, forwarded queries at
/// `info` and everything else at `debug`.
pub struct QueryLogger {
    protocol: Protocol,
}

macro_rules! query_event {
    (
        $level:ident,
        $protocol:expr,
        $name:expr,
        $qtype:expr,
        $rcode:expr,
        $outcome:expr,
        $elapsed:expr,
        $upstream:expr
    ) => {
        $level!(
            protocol = %$protocol,
            name = %$name,
            qtype = %$qtype,
            rcode = %$rcode,
            outcome = %$outcome,
            elapsed_ms = $elapsed,
            upstream = $upstream,
            "query"
        )
    };
}

impl QueryLogger {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    pub fn log(&self, req: &Message, res: &Resolution, elapsed: Duration) {
        let (name, qtype) = match req.queries().first() {
            Some(query) => (query.name().to_string(), query.query_type().to_string()),
            None => ("<none>".to_string(), "-".to_string()),
        };
        let rcode = res.message.response_code();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let upstream = res.upstream.as_deref().unwrap_or("-");
        let (protocol, outcome) = (self.protocol, res.outcome);

        if rcode == ResponseCode::ServFail || outcome == Outcome::Failed {
            query_event!(error, protocol, name, qtype, rcode, outcome, elapsed_ms, upstream);
        } else if outcome == Outcome::Blocked {
            query_event!(warn, protocol, name, qtype, rcode, outcome, elapsed_ms, upstream);
        } else if outcome == Outcome::Forwarded {
            query_event!(info, protocol, name, qtype, rcode, outcome, elapsed_ms, upstream);
        } else {
            query_event!(debug, protocol, name, qtype, rcode, outcome, elapsed_ms, upstream);
        }
    }
}

/// Resolve one raw client query and encode the reply for `protocol`.
///
/// Returns `None` only when the packet is too short to answer at all. A
/// packet that fails to decode gets a FORMERR reply.
pub(crate) async fn handle(
    resolver: &Resolver,
    packet: &[u8],
    protocol: Protocol,
) -> Option<Vec<u8>> {
    let started = Instant::now();

    let req = match Message::from_vec(packet) {
        Ok(req) => req,
        Err(e) => {
            debug!(protocol = %protocol, error = %e, "malformed query");
            return format_error(packet);
        }
    };

    let res = resolver.resolve(&req, protocol).await;
    let elapsed = started.elapsed();
    QueryLogger::new(protocol).log(&req, &res, elapsed);
    resolver.stats().record(res.outcome, elapsed);

    let encoded = match protocol {
        Protocol::Udp => encode_udp(&res.message, max_udp_payload(&req)),
        Protocol::Tcp => res.message.to_vec().map_err(crate::error::Error::from),
    };

    match encoded {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(protocol = %protocol, error = %e, "failed to encode reply");
            let fallback = crate::dns::error_reply(&req, ResponseCode::ServFail);
            fallback.to_vec().ok()
        }
    }
}

/// FORMERR reply echoing the id of an undecodable packet.
fn format_error(packet: &[u8]) -> Option<Vec<u8>> {
    if packet.len() < HEADER_LEN {
        return None;
    }

    let mut resp = Message::new();
    resp.set_id(u16::from_be_bytes([packet[0], packet[1]]))
        .set_message_type(MessageType::Response)
        .set_recursion_available(true)
        .set_response_code(ResponseCode::FormErr);
    resp.to_vec().ok()
}
