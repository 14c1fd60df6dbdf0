//! DNS-over-HTTPS using the JSON API.
//!
//! The endpoint host is resolved once, at construction, through a fixed set
//! of bootstrap nameservers so the resolver never depends on itself. Each
//! resolved address becomes one race target; TLS still verifies the
//! original host name.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::txt::RDataParser;
use http_body_util::{BodyExt, Empty};
use hyper::header::{ACCEPT, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use rand::Rng;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};
use url::{Host, Url};

use super::{Timeouts, Upstreams, log_unusable, race};
use crate::dns::reply_to;
use crate::error::{Error, Result};
use crate::transport::Protocol;

/// Nameservers used to resolve a DoH endpoint's own host name.
pub const BOOTSTRAP_SERVERS: [SocketAddr; 4] = [
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53),
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 4, 4)), 53),
    SocketAddr::new(IpAddr::V6(Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888)), 53),
    SocketAddr::new(IpAddr::V6(Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8844)), 53),
];

/// Padded length of the request query string.
const QUERY_LEN: usize = 512;

const HEX: &[u8; 16] = b"0123456789abcdef";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpsOptions {
    /// Ask the server not to validate DNSSEC (`cd=1`).
    pub no_dnssec: bool,
    /// Skip the random padding parameter.
    pub no_padding: bool,
}

#[derive(Debug, Deserialize)]
struct JsonResponse {
    #[serde(rename = "Status")]
    status: u16,
    #[serde(rename = "TC", default)]
    tc: bool,
    #[serde(rename = "RD", default)]
    rd: bool,
    #[serde(rename = "RA", default)]
    ra: bool,
    #[serde(rename = "AD", default)]
    ad: bool,
    #[serde(rename = "CD", default)]
    cd: bool,
    #[serde(rename = "Answer", default)]
    answer: Vec<JsonRecord>,
    #[serde(rename = "Authority", default)]
    authority: Vec<JsonRecord>,
    #[serde(rename = "Additional", default)]
    additional: Vec<JsonRecord>,
}

#[derive(Debug, Deserialize)]
struct JsonRecord {
    #[serde(alias = "Name")]
    name: String,
    #[serde(rename = "type", alias = "Type")]
    rtype: u16,
    #[serde(rename = "TTL", default)]
    ttl: u32,
    #[serde(alias = "Data")]
    data: String,
}

impl JsonRecord {
    fn to_record(&self) -> Result<Record> {
        let name = Name::from_str(&self.name)?;
        let rtype = RecordType::from(self.rtype);
        let rdata =
            RData::try_from_str(rtype, &self.data).map_err(|e| Error::RData(e.to_string()))?;
        Ok(Record::from_rdata(name, self.ttl, rdata))
    }
}

impl JsonResponse {
    /// Translate into a wire-format reply to `req`. Records that fail to
    /// parse are skipped.
    fn into_message(self, req: &Message) -> Message {
        let mut resp = reply_to(req);
        resp.set_response_code(self.status.into())
            .set_truncated(self.tc)
            .set_recursion_desired(self.rd)
            .set_recursion_available(self.ra)
            .set_authentic_data(self.ad)
            .set_checking_disabled(self.cd);

        resp.add_answers(parse_records(&self.answer));
        resp.add_name_servers(parse_records(&self.authority));
        resp.add_additionals(parse_records(&self.additional));
        resp
    }
}

fn parse_records(records: &[JsonRecord]) -> Vec<Record> {
    records
        .iter()
        .filter_map(|rr| match rr.to_record() {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    name = %rr.name,
                    rtype = rr.rtype,
                    error = %e,
                    "skipping unparsable https record"
                );
                None
            }
        })
        .collect()
}

fn random_hex(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len).map(|_| HEX[rng.random_range(0..HEX.len())] as char).collect()
}

fn encode_query(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// A DNS-over-HTTPS endpoint and the addresses it resolved to.
pub struct HttpsUpstream {
    endpoint: Url,
    /// Name checked against the server certificate.
    server_name: String,
    /// `Host` header value.
    authority: String,
    targets: Vec<SocketAddr>,
    tls: TlsConnector,
    options: HttpsOptions,
}

impl HttpsUpstream {
    /// Prepare `endpoint`, resolving its host through [`BOOTSTRAP_SERVERS`]
    /// unless it is an IP literal.
    pub async fn new(endpoint: &str, options: HttpsOptions, timeouts: Timeouts) -> Result<Self> {
        let url = Url::parse(endpoint)?;
        if url.scheme() != "https" {
            return Err(Error::InvalidUpstream(endpoint.to_string()));
        }

        let port = url.port_or_known_default().unwrap_or(443);
        let (server_name, ips) = match url.host() {
            Some(Host::Ipv4(ip)) => (ip.to_string(), vec![IpAddr::V4(ip)]),
            Some(Host::Ipv6(ip)) => (ip.to_string(), vec![IpAddr::V6(ip)]),
            Some(Host::Domain(domain)) => (domain.to_string(), bootstrap(domain, timeouts).await?),
            None => return Err(Error::InvalidUpstream(endpoint.to_string())),
        };

        let authority = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => server_name.clone(),
        };

        let targets: Vec<SocketAddr> =
            ips.into_iter().map(|ip| SocketAddr::new(ip, port)).collect();
        info!(endpoint = %url, targets = ?targets, "https upstream ready");

        Ok(Self {
            endpoint: url,
            server_name,
            authority,
            targets,
            tls: tls_connector()?,
            options,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn targets(&self) -> &[SocketAddr] {
        &self.targets
    }

    /// Race `req` across every resolved address of the endpoint.
    pub(super) async fn lookup(
        self: &Arc<Self>,
        req: &Message,
        timeouts: Timeouts,
    ) -> Option<(Message, String)> {
        let req = Arc::new(req.clone());
        race(&self.targets, timeouts.lookup_interval, |target| {
            let this = Arc::clone(self);
            let req = req.clone();
            async move { this.attempt(target, &req, timeouts).await }
        })
        .await
        .map(|(msg, target)| (msg, format!("{} ({target})", self.endpoint)))
    }

    async fn attempt(
        &self,
        target: SocketAddr,
        req: &Message,
        timeouts: Timeouts,
    ) -> Option<Message> {
        let upstream = format!("{} ({target})", self.endpoint);
        debug!(upstream = %upstream, "upstream attempt");
        match self.exchange(target, req, timeouts).await {
            Ok(resp) if resp.response_code() == ResponseCode::ServFail => {
                log_unusable(&upstream, &Error::ServerFailure(upstream.clone()));
                None
            }
            Ok(resp) => Some(resp),
            Err(e) => {
                log_unusable(&upstream, &e);
                None
            }
        }
    }

    /// Path and query string for `query`, padded to [`QUERY_LEN`].
    fn request_path(&self, query: &Query) -> String {
        let mut pairs: Vec<(String, String)> = self
            .endpoint
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.push(("name".into(), query.name().to_ascii()));
        pairs.push(("type".into(), u16::from(query.query_type()).to_string()));
        if self.options.no_dnssec {
            pairs.push(("cd".into(), "1".into()));
        }

        if !self.options.no_padding {
            let len = encode_query(&pairs).len();
            pairs.push(("random_padding".into(), random_hex(QUERY_LEN.saturating_sub(len))));
        }

        format!("{}?{}", self.endpoint.path(), encode_query(&pairs))
    }

    async fn exchange(
        &self,
        target: SocketAddr,
        req: &Message,
        timeouts: Timeouts,
    ) -> Result<Message> {
        let query = req
            .queries()
            .first()
            .ok_or_else(|| Error::HttpRequest("query without a question".into()))?;
        let path = self.request_path(query);
        let timed_out = || Error::Timeout(target.to_string());

        let tcp = timeout(timeouts.dial, TcpStream::connect(target))
            .await
            .map_err(|_| timed_out())??;
        let server_name = ServerName::try_from(self.server_name.clone())
            .map_err(|e| Error::ServerName(e.to_string()))?;
        let tls = timeout(timeouts.client, self.tls.connect(server_name, tcp))
            .await
            .map_err(|_| timed_out())??;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tls)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "https connection closed");
            }
        });

        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(HOST, &self.authority)
            .header(ACCEPT, "application/dns-json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| Error::HttpRequest(e.to_string()))?;

        let response = timeout(timeouts.client, sender.send_request(request))
            .await
            .map_err(|_| timed_out())??;
        if response.status() != StatusCode::OK {
            return Err(Error::HttpStatus(response.status().as_u16()));
        }

        let body = timeout(timeouts.client, response.into_body().collect())
            .await
            .map_err(|_| timed_out())??
            .to_bytes();

        let json: JsonResponse = serde_json::from_slice(&body)?;
        Ok(json.into_message(req))
    }
}

fn tls_connector() -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Resolve `host` to its IPv4 and IPv6 addresses through the bootstrap
/// nameservers.
async fn bootstrap(host: &str, timeouts: Timeouts) -> Result<Vec<IpAddr>> {
    let name = Name::from_str(&format!("{}.", host.trim_end_matches('.')))?;
    let servers = Upstreams::Classic(BOOTSTRAP_SERVERS.to_vec());
    let mut ips = Vec::new();

    for qtype in [RecordType::A, RecordType::AAAA] {
        let mut req = Message::new();
        req.set_id(rand::random())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);
        req.add_query(Query::query(name.clone(), qtype));

        let lookup = servers.lookup(&req, Protocol::Udp, timeouts);
        let Ok(Some((resp, _))) = timeout(timeouts.deadline(), lookup).await else {
            continue;
        };

        ips.extend(resp.answers().iter().filter_map(|record| match record.data()? {
            RData::A(a) => Some(IpAddr::V4(a.0)),
            RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        }));
    }

    if ips.is_empty() {
        return Err(Error::Bootstrap(host.to_string()));
    }
    debug!(host, ips = ?ips, "bootstrapped https host");
    Ok(ips)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, qtype: RecordType) -> Message {
        let mut req = Message::new();
        req.set_id(99)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);
        req.add_query(Query::query(Name::from_str(name).unwrap(), qtype));
        req
    }

    async fn upstream(endpoint: &str, options: HttpsOptions) -> HttpsUpstream {
        HttpsUpstream::new(endpoint, options, Timeouts::default()).await.unwrap()
    }

    fn query_string(path: &str) -> &str {
        path.split_once('?').map(|(_, q)| q).unwrap_or("")
    }

    #[tokio::test]
    async fn new_skips_bootstrap_for_ip_literals() {
        let doh = upstream("https://1.1.1.1/dns-query", HttpsOptions::default()).await;
        assert_eq!(doh.targets(), &["1.1.1.1:443".parse::<SocketAddr>().unwrap()]);

        let url = "https://[2606:4700:4700::1111]:8443/dns-query";
        let doh = upstream(url, HttpsOptions::default()).await;
        let target: SocketAddr = "[2606:4700:4700::1111]:8443".parse().unwrap();
        assert_eq!(doh.targets(), &[target]);
        assert_eq!(doh.server_name, "2606:4700:4700::1111");
        assert_eq!(doh.authority, "[2606:4700:4700::1111]:8443");
    }

    #[tokio::test]
    async fn new_rejects_plain_http() {
        let url = "http://1.1.1.1/dns-query";
        let result = HttpsUpstream::new(url, HttpsOptions::default(), Timeouts::default()).await;
        assert!(matches!(result, Err(Error::InvalidUpstream(_))));
    }

    #[tokio::test]
    async fn request_path_pads_query_string() {
        let doh = upstream("https://8.8.8.8/resolve", HttpsOptions::default()).await;
        let req = request("www.example.com.", RecordType::AAAA);

        let path = doh.request_path(&req.queries()[0]);
        assert!(path.starts_with("/resolve?name=www.example.com.&type=28&random_padding="));
        assert!(query_string(&path).len() >= QUERY_LEN);
        assert!(!path.contains("cd=1"));
    }

    #[tokio::test]
    async fn request_path_honours_options() {
        let options = HttpsOptions {
            no_dnssec: true,
            no_padding: true,
        };
        let doh = upstream("https://8.8.8.8/resolve?ct=application/dns-json", options).await;
        let req = request("example.com.", RecordType::A);

        let path = doh.request_path(&req.queries()[0]);
        assert_eq!(path, "/resolve?ct=application%2Fdns-json&name=example.com.&type=1&cd=1");
    }

    #[test]
    fn into_message_maps_json_fields() {
        let body = r#"{
            "Status": 0, "TC": false, "RD": true, "RA": true, "AD": true, "CD": false,
            "Question": [{"name": "example.com.", "type": 15}],
            "Answer": [
                {"name": "example.com.", "type": 15, "TTL": 300, "data": "10 mail.example.com."},
                {"name": "example.com.", "type": 15, "TTL": 300, "data": "not an mx record"}
            ],
            "Additional": [
                {"name": "mail.example.com.", "type": 1, "TTL": 60, "data": "192.0.2.25"}
            ]
        }"#;
        let json: JsonResponse = serde_json::from_str(body).unwrap();
        let req = request("example.com.", RecordType::MX);

        let resp = json.into_message(&req);

        assert_eq!(resp.id(), 99);
        assert_eq!(resp.response_code(), ResponseCode::NoError);
        assert!(resp.authentic_data());
        assert_eq!(resp.answers().len(), 1);
        assert_eq!(resp.answers()[0].record_type(), RecordType::MX);
        assert_eq!(resp.answers()[0].ttl(), 300);
        assert_eq!(resp.additionals().len(), 1);
        assert_eq!(
            resp.additionals()[0].data(),
            Some(&RData::A(hickory_proto::rr::rdata::A::new(192, 0, 2, 25)))
        );
    }

    #[test]
    fn into_message_maps_nxdomain_with_authority() {
        let body = r#"{
            "Status": 3, "TC": false, "RD": true, "RA": true, "AD": false, "CD": false,
            "Authority": [
                {"name": "example.com.", "type": 6, "TTL": 900,
                 "data": "ns1.example.com. hostmaster.example.com. 2024010101 7200 900 1209600 300"}
            ]
        }"#;
        let json: JsonResponse = serde_json::from_str(body).unwrap();
        let resp = json.into_message(&request("nx.example.com.", RecordType::A));

        assert_eq!(resp.response_code(), ResponseCode::NXDomain);
        assert!(resp.answers().is_empty());
        match resp.name_servers()[0].data() {
            Some(RData::SOA(soa)) => assert_eq!(soa.minimum(), 300),
            other => panic!("expected soa, got {other:?}"),
        }
    }

    #[test]
    fn random_hex_has_requested_length() {
        let pad = random_hex(37);
        assert_eq!(pad.len(), 37);
        assert!(pad.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(random_hex(0), "");
    }
}
