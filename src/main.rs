use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sinkhole::config::{DEFAULT_FORWARDERS, OverrideSpec, ServerConfig, ZoneSpec};
use sinkhole::filter::{Blocklist, ListFormat, StoreBackend};
use sinkhole::resolver::{BlockReply, DEFAULT_WHITELIST};
use sinkhole::upstream::{HttpsOptions, Timeouts};

#[derive(Parser)]
#[command(name = "sinkhole")]
#[command(about = "Caching, ad-blocking DNS resolver", long_about = None)]
struct Args {
    /// Local port to listen on (UDP and TCP)
    #[arg(short, long, default_value_t = 5353)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,

    /// Default forwarder: nameserver address or a single https:// DoH endpoint
    #[arg(short, long = "forward", default_values_t = DEFAULT_FORWARDERS.map(String::from))]
    forward: Vec<String>,

    /// Per-zone forwarders, as <zone>=<addr>[,<addr>...]
    #[arg(long = "zone")]
    zones: Vec<ZoneSpec>,

    /// Static answers, as <host>=<ip>[,<ip>...]
    #[arg(long = "override")]
    overrides: Vec<OverrideSpec>,

    /// TTL of override answers, in seconds
    #[arg(long, default_value_t = 3600)]
    override_ttl: u32,

    /// Address returned for blocked A queries
    #[arg(long, default_value_t = Ipv4Addr::LOCALHOST)]
    block_ipv4: Ipv4Addr,

    /// Address returned for blocked AAAA queries
    #[arg(long, default_value_t = Ipv6Addr::LOCALHOST)]
    block_ipv6: Ipv6Addr,

    /// TTL of blocked answers, in seconds
    #[arg(long, default_value_t = 3600)]
    block_ttl: u32,

    /// Hosts that are never blocked
    #[arg(long, default_values_t = DEFAULT_WHITELIST.map(String::from))]
    whitelist: Vec<String>,

    /// Block store implementation
    #[arg(long, value_enum, default_value_t = StoreBackend::Radix)]
    block_store: StoreBackend,

    /// File with one blocked host per line
    #[arg(long = "blocklist")]
    blocklists: Vec<PathBuf>,

    /// File in /etc/hosts format listing blocked hosts
    #[arg(long = "hosts-file")]
    hosts_files: Vec<PathBuf>,

    /// How often blocklist files are checked for changes, in seconds
    #[arg(long, default_value_t = 60)]
    blocklist_interval: u64,

    /// Upstream read/write timeout, in milliseconds
    #[arg(long, default_value_t = 5000)]
    client_timeout: u64,

    /// Upstream connect timeout, in milliseconds
    #[arg(long, default_value_t = 2000)]
    dial_timeout: u64,

    /// Delay before the next upstream joins a lookup, in milliseconds
    #[arg(long, default_value_t = 200)]
    lookup_interval: u64,

    /// Entries per cache table
    #[arg(long, default_value_t = sinkhole::cache::DEFAULT_SIZE)]
    cache_size: usize,

    /// Interval between cache prunes, in seconds
    #[arg(long, default_value_t = 3600)]
    cache_prune_interval: u64,

    /// Disable the response cache
    #[arg(long)]
    no_cache: bool,

    /// Ask DoH servers not to validate DNSSEC
    #[arg(long)]
    doh_no_dnssec: bool,

    /// Do not pad DoH queries
    #[arg(long)]
    doh_no_padding: bool,

    /// Log filter, e.g. `info` or `sinkhole=debug`; RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let blocklists = self
            .blocklists
            .into_iter()
            .map(|path| Blocklist::new(path, ListFormat::Domains))
            .chain(
                self.hosts_files
                    .into_iter()
                    .map(|path| Blocklist::new(path, ListFormat::Hosts)),
            )
            .collect();

        ServerConfig {
            listen: SocketAddr::new(self.bind, self.port),
            forward: self.forward,
            zones: self.zones,
            overrides: self.overrides,
            override_ttl: self.override_ttl,
            block: BlockReply {
                ipv4: self.block_ipv4,
                ipv6: self.block_ipv6,
                ttl: self.block_ttl,
            },
            whitelist: self.whitelist,
            block_store: self.block_store,
            blocklists,
            blocklist_interval: Duration::from_secs(self.blocklist_interval),
            timeouts: Timeouts {
                dial: Duration::from_millis(self.dial_timeout),
                client: Duration::from_millis(self.client_timeout),
                lookup_interval: Duration::from_millis(self.lookup_interval),
            },
            cache_size: self.cache_size,
            cache_prune_interval: Duration::from_secs(self.cache_prune_interval),
            no_cache: self.no_cache,
            https: HttpsOptions {
                no_dnssec: self.doh_no_dnssec,
                no_padding: self.doh_no_padding,
            },
            ..ServerConfig::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&args.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(sinkhole::server::run(args.into_config()))?;

    Ok(())
}
