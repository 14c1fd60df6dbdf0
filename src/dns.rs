//! DNS message helpers shared by the resolver, cache and transports.

use std::net::IpAddr;

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};

use crate::error::Result;
use crate::filter::normalize_host;

/// Smallest payload every DNS client accepts over UDP.
pub const MIN_UDP_PAYLOAD: u16 = 512;

/// Host name used for policy lookups: lower-case, no trailing dot.
pub fn query_host(name: &Name) -> String {
    normalize_host(&name.to_ascii())
}

/// Start a reply to `req`, copying its id, opcode, flags and questions.
///
/// Every reply advertises recursion as available.
pub fn reply_to(req: &Message) -> Message {
    let mut resp = Message::new();
    resp.set_id(req.id())
        .set_message_type(MessageType::Response)
        .set_op_code(req.op_code())
        .set_recursion_desired(req.recursion_desired())
        .set_checking_disabled(req.checking_disabled())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError);
    resp.add_queries(req.queries().iter().cloned());
    resp
}

/// A reply to `req` carrying only `rcode`.
pub fn error_reply(req: &Message, rcode: ResponseCode) -> Message {
    let mut resp = reply_to(req);
    resp.set_response_code(rcode);
    resp
}

/// Answer `req` with fixed addresses for `name`.
///
/// Only addresses of the family asked for are used: IPv4 for `A`, IPv6 for
/// `AAAA`. Returns `None` when none of `ips` fit the question.
pub fn address_reply(
    req: &Message,
    name: &Name,
    qtype: RecordType,
    ips: &[IpAddr],
    ttl: u32,
) -> Option<Message> {
    let answers: Vec<Record> = ips
        .iter()
        .filter_map(|ip| match (qtype, ip) {
            (RecordType::A, IpAddr::V4(v4)) => Some(RData::A(A::from(*v4))),
            (RecordType::AAAA, IpAddr::V6(v6)) => Some(RData::AAAA(AAAA::from(*v6))),
            _ => None,
        })
        .map(|rdata| Record::from_rdata(name.clone(), ttl, rdata))
        .collect();

    if answers.is_empty() {
        return None;
    }

    let mut resp = reply_to(req);
    resp.add_answers(answers);
    Some(resp)
}

/// Largest UDP reply `req`'s sender is willing to receive.
pub fn max_udp_payload(req: &Message) -> u16 {
    req.max_payload().max(MIN_UDP_PAYLOAD)
}

/// Encode `resp` for a UDP client, dropping every record section and setting
/// TC when it does not fit in `max_payload` bytes.
pub fn encode_udp(resp: &Message, max_payload: u16) -> Result<Vec<u8>> {
    let bytes = resp.to_vec()?;
    if bytes.len() <= max_payload as usize {
        return Ok(bytes);
    }

    let mut truncated = resp.clone();
    truncated.take_answers();
    truncated.take_name_servers();
    truncated.take_additionals();
    truncated.set_truncated(true);
    Ok(truncated.to_vec()?)
}
