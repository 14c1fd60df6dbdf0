//! Upstream resolvers and the staggered lookup race.
//!
//! A query is sent to the first upstream immediately. Every lookup interval
//! without a usable answer, the next upstream in the list is tried too. The
//! first usable answer wins; slower attempts finish on their own and their
//! results are dropped.

mod classic;
mod https;

use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Message;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::warn;

use crate::error::{Error, Result};
use crate::transport::Protocol;

pub use classic::exchange;
pub(crate) use classic::read_framed;
pub use https::{BOOTSTRAP_SERVERS, HttpsOptions, HttpsUpstream};

/// Port used when a nameserver is given without one.
pub const DNS_PORT: u16 = 53;

/// Timing knobs shared by every upstream lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on establishing a connection.
    pub dial: Duration,
    /// Bound on each read and write.
    pub client: Duration,
    /// Delay before the next upstream joins the race.
    pub lookup_interval: Duration,
}

impl Timeouts {
    /// Overall budget for answering one client query.
    pub fn deadline(&self) -> Duration {
        self.dial + self.client * 2
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            dial: Duration::from_secs(2),
            client: Duration::from_secs(5),
            lookup_interval: Duration::from_millis(200),
        }
    }
}

/// Run `attempt` against `targets` top-down, starting one more every
/// `interval`, and return the first usable answer with the target that gave
/// it.
///
/// An attempt returning `None` is unusable; when one fails before the
/// interval elapses the next target is dispatched right away. Once every
/// target is dispatched the race waits roughly one more interval per
/// outstanding attempt before giving up.
pub async fn race<T, F, Fut>(targets: &[T], interval: Duration, attempt: F) -> Option<(Message, T)>
where
    T: Clone + Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Option<Message>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Option<(Message, T)>>(targets.len().max(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut answered = 0;

    for target in targets {
        let fut = attempt(target.clone());
        let target = target.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = fut.await.map(|msg| (msg, target));
            // the race may already be over
            let _ = tx.try_send(result);
        });

        tokio::select! {
            result = rx.recv() => match result {
                Some(Some(found)) => return Some(found),
                Some(None) => answered += 1,
                None => {}
            },
            _ = ticker.tick() => {}
        }
    }
    drop(tx);

    for _ in answered..targets.len() {
        tokio::select! {
            result = rx.recv() => match result {
                Some(Some(found)) => return Some(found),
                Some(None) => {}
                None => return None,
            },
            _ = ticker.tick() => {}
        }
    }

    None
}

/// Parse a nameserver address, defaulting the port to 53.
pub fn parse_nameserver(s: &str) -> Result<SocketAddr> {
    let s = s.trim();
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let ip = s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')).unwrap_or(s);
    ip.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| Error::InvalidUpstream(s.to_string()))
}

/// The resolvers a zone forwards to.
#[derive(Clone)]
pub enum Upstreams {
    /// Plain DNS nameservers, raced in order.
    Classic(Vec<SocketAddr>),
    /// A DNS-over-HTTPS endpoint, raced across its resolved addresses.
    Https(Arc<HttpsUpstream>),
}

impl Upstreams {
    /// Build from configured forwarders.
    ///
    /// A single `https://` entry selects DNS-over-HTTPS, resolving its host
    /// through the bootstrap servers. Anything else must be a list of
    /// nameserver addresses.
    pub async fn from_specs(
        specs: &[String],
        options: HttpsOptions,
        timeouts: Timeouts,
    ) -> Result<Self> {
        if let [spec] = specs {
            if spec.starts_with("https://") {
                let upstream = HttpsUpstream::new(spec, options, timeouts).await?;
                return Ok(Self::Https(Arc::new(upstream)));
            }
        }

        specs
            .iter()
            .map(|spec| parse_nameserver(spec))
            .collect::<Result<Vec<_>>>()
            .map(Self::Classic)
    }

    /// Race `req` across these upstreams. Returns the answer and the
    /// upstream that produced it.
    pub async fn lookup(
        &self,
        req: &Message,
        protocol: Protocol,
        timeouts: Timeouts,
    ) -> Option<(Message, String)> {
        match self {
            Self::Classic(servers) => {
                let req = Arc::new(req.clone());
                race(servers, timeouts.lookup_interval, |server| {
                    let req = req.clone();
                    async move { classic::attempt(server, &req, protocol, timeouts).await }
                })
                .await
                .map(|(msg, server)| (msg, server.to_string()))
            }
            Self::Https(upstream) => upstream.lookup(req, timeouts).await,
        }
    }
}

impl fmt::Display for Upstreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classic(servers) => {
                let servers: Vec<String> = servers.iter().map(SocketAddr::to_string).collect();
                write!(f, "{}", servers.join(", "))
            }
            Self::Https(upstream) => write!(f, "{}", upstream.endpoint()),
        }
    }
}

impl fmt::Debug for Upstreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Upstreams({self})")
    }
}

pub(crate) fn log_unusable(upstream: &str, error: &Error) {
    warn!(upstream, error = %error, "upstream attempt unusable");
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::ResponseCode;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn answer(id: u16) -> Message {
        let mut msg = Message::new();
        msg.set_id(id).set_response_code(ResponseCode::NoError);
        msg
    }

    #[tokio::test]
    async fn race_skips_failed_upstream_without_waiting() {
        let dispatched = Arc::new(Mutex::new(Vec::new()));
        let started = Instant::now();

        let result = {
            let dispatched = dispatched.clone();
            race(&[1u16, 2, 3], Duration::from_millis(50), move |n| {
                dispatched.lock().unwrap().push(n);
                async move {
                    match n {
                        1 => None,
                        2 => {
                            tokio::time::sleep(Duration::from_millis(30)).await;
                            Some(answer(2))
                        }
                        _ => Some(answer(3)),
                    }
                }
            })
            .await
        };

        let (msg, target) = result.unwrap();
        assert_eq!(target, 2);
        assert_eq!(msg.id(), 2);
        assert_eq!(*dispatched.lock().unwrap(), vec![1, 2]);
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn race_staggers_slow_upstreams() {
        let dispatched = Arc::new(AtomicUsize::new(0));

        let result = {
            let dispatched = dispatched.clone();
            race(&[1u16, 2], Duration::from_millis(20), move |n| {
                dispatched.fetch_add(1, Ordering::SeqCst);
                async move {
                    let delay = if n == 1 { 200 } else { 10 };
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Some(answer(n))
                }
            })
            .await
        };

        assert_eq!(result.unwrap().1, 2);
        assert_eq!(dispatched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn race_waits_for_stragglers_after_dispatching_all() {
        let result = race(&[1u16], Duration::from_millis(20), |n| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Some(answer(n))
        })
        .await;

        assert_eq!(result.unwrap().1, 1);
    }

    #[tokio::test]
    async fn race_fails_when_every_upstream_fails() {
        let started = Instant::now();
        let result = race(&[1u16, 2, 3], Duration::from_millis(500), |_| async { None }).await;

        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn race_with_no_targets_fails() {
        let result = race(&[] as &[u16], Duration::from_millis(10), |_| async { None }).await;
        assert!(result.is_none());
    }

    #[test]
    fn parse_nameserver_defaults_port() {
        assert_eq!(parse_nameserver("8.8.8.8").unwrap(), "8.8.8.8:53".parse().unwrap());
        assert_eq!(parse_nameserver("1.1.1.1:5353").unwrap(), "1.1.1.1:5353".parse().unwrap());
        assert_eq!(
            parse_nameserver("[2001:4860:4860::8888]").unwrap(),
            "[2001:4860:4860::8888]:53".parse().unwrap()
        );
        assert_eq!(parse_nameserver("::1").unwrap(), "[::1]:53".parse().unwrap());
        assert!(parse_nameserver("dns.google").is_err());
    }

    #[tokio::test]
    async fn from_specs_builds_classic_upstreams() {
        let specs = vec!["8.8.8.8".to_string(), "8.8.4.4:53".to_string()];
        let upstreams = Upstreams::from_specs(&specs, HttpsOptions::default(), Timeouts::default())
            .await
            .unwrap();

        match upstreams {
            Upstreams::Classic(servers) => assert_eq!(servers.len(), 2),
            Upstreams::Https(_) => panic!("expected classic upstreams"),
        }
    }

    #[tokio::test]
    async fn from_specs_rejects_mixed_https() {
        let specs = vec!["8.8.8.8".to_string(), "https://dns.google/resolve".to_string()];
        let options = HttpsOptions::default();
        let result = Upstreams::from_specs(&specs, options, Timeouts::default()).await;

        assert!(matches!(result, Err(Error::InvalidUpstream(_))));
    }

    #[test]
    fn timeouts_deadline_covers_dial_and_round_trip() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.deadline(), Duration::from_secs(12));
    }
}
