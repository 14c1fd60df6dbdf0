//! Blocklist files feeding a block store.
//!
//! Each [`Blocklist`] owns one file on disk and acts as a single source for
//! [`HostAdder`]. Whenever the file changes, every host it previously
//! asserted is withdrawn and the current contents are re-added.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{HostAdder, normalize_host};
use crate::error::Result;

const MAX_HOST_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Line layout of a blocklist file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    /// `/etc/hosts` style: `<ip> <host>`, the host is the second field.
    Hosts,
    /// One host per line.
    Domains,
}

/// Extract the host a single line asserts, if any.
///
/// Comments start at `#`. The result is lower-cased and has any trailing
/// root dot or `:port` removed, but is not validated.
pub fn parse_line(line: &str, format: ListFormat) -> Option<String> {
    let line = match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    };

    let mut fields = line.split_whitespace();
    let field = match format {
        ListFormat::Hosts => {
            fields.next()?;
            fields.next()?
        }
        ListFormat::Domains => fields.next()?,
    };

    let host = normalize_host(field);
    (!host.is_empty()).then_some(host)
}

/// Whether `host` is a syntactically valid host name.
pub fn validate_host(host: &str) -> bool {
    if host.is_empty() || host.len() > MAX_HOST_LEN {
        return false;
    }

    host.split('.').all(|label| {
        let bytes = label.as_bytes();
        !bytes.is_empty()
            && bytes.len() <= MAX_LABEL_LEN
            && bytes[0] != b'-'
            && bytes[bytes.len() - 1] != b'-'
            && bytes
                .iter()
                .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
    })
}

/// A file of blocked hosts.
#[derive(Debug, Clone)]
pub struct Blocklist {
    path: PathBuf,
    format: ListFormat,
}

impl Blocklist {
    pub fn new(path: impl Into<PathBuf>, format: ListFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source id this list uses with its block store.
    pub fn source(&self) -> String {
        self.path.display().to_string()
    }

    /// Replace everything this list asserted with the hosts in `text`.
    ///
    /// Returns the number of valid hosts added.
    pub fn load_str(&self, text: &str, adder: &dyn HostAdder) -> usize {
        let source = self.source();
        adder.reset(&source);

        let mut added = 0;
        for (lineno, line) in text.lines().enumerate() {
            let Some(host) = parse_line(line, self.format) else {
                continue;
            };

            if !validate_host(&host) {
                debug!(source = %source, line = lineno + 1, host = %host, "skipping invalid host");
                continue;
            }

            adder.add_host(&source, &host);
            added += 1;
        }

        added
    }

    /// Read the file and load it into `adder`.
    pub async fn load(&self, adder: &dyn HostAdder) -> Result<usize> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let added = self.load_str(&text, adder);
        info!(source = %self.path.display(), hosts = added, "loaded blocklist");
        Ok(added)
    }

    /// Poll the file every `interval`, reloading when its modification time
    /// changes. The first poll always loads.
    pub fn watch(self, adder: Arc<dyn HostAdder>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut seen: Option<SystemTime> = None;

            loop {
                ticker.tick().await;

                let metadata = tokio::fs::metadata(&self.path).await;
                let modified = match metadata.and_then(|m| m.modified()) {
                    Ok(modified) => modified,
                    Err(e) => {
                        warn!(source = %self.path.display(), error = %e, "blocklist unavailable");
                        continue;
                    }
                };

                if seen == Some(modified) {
                    continue;
                }

                match self.load(adder.as_ref()).await {
                    Ok(_) => seen = Some(modified),
                    Err(e) => {
                        warn!(source = %self.path.display(), error = %e, "failed to load blocklist")
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{StoreBackend, new_store};

    #[test]
    fn parse_line_reads_hosts_format() {
        assert_eq!(
            parse_line("0.0.0.0 Ads.Example.com. # tracker", ListFormat::Hosts),
            Some("ads.example.com".to_string())
        );
        assert_eq!(
            parse_line("127.0.0.1\tads.example.com:8080", ListFormat::Hosts),
            Some("ads.example.com".to_string())
        );
        assert_eq!(parse_line("0.0.0.0", ListFormat::Hosts), None);
        assert_eq!(parse_line("# 0.0.0.0 ads.example.com", ListFormat::Hosts), None);
    }

    #[test]
    fn parse_line_reads_domains_format() {
        assert_eq!(
            parse_line("  tracker.example.net  ", ListFormat::Domains),
            Some("tracker.example.net".to_string())
        );
        assert_eq!(parse_line("", ListFormat::Domains), None);
        assert_eq!(parse_line("   # comment", ListFormat::Domains), None);
    }

    #[test]
    fn validate_host_checks_labels() {
        assert!(validate_host("example.com"));
        assert!(validate_host("_dmarc.example-site.com"));
        assert!(validate_host("a1.b2"));

        assert!(!validate_host(""));
        assert!(!validate_host("-example.com"));
        assert!(!validate_host("example-.com"));
        assert!(!validate_host("example..com"));
        assert!(!validate_host("exa mple.com"));
        assert!(!validate_host(&format!("{}.com", "a".repeat(64))));
        assert!(!validate_host(&"a.".repeat(127)));
    }

    #[test]
    fn load_str_replaces_previous_contents() {
        let store = new_store(StoreBackend::Radix);
        let list = Blocklist::new("/lists/ads", ListFormat::Hosts);

        let added = list.load_str(
            concat!(
                "# ad servers\n",
                "0.0.0.0 ads.example.com\n",
                "0.0.0.0 bad_host!\n",
                "0.0.0.0 tracker.example.net\n",
            ),
            store.as_ref(),
        );
        assert_eq!(added, 2);
        assert!(store.block("ads.example.com"));
        assert!(store.block("tracker.example.net"));

        list.load_str("0.0.0.0 tracker.example.net\n", store.as_ref());
        assert!(!store.block("ads.example.com"));
        assert!(store.block("tracker.example.net"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn load_str_keeps_other_sources() {
        let store = new_store(StoreBackend::Hash);
        let ads = Blocklist::new("ads.txt", ListFormat::Domains);
        let trackers = Blocklist::new("trackers.txt", ListFormat::Domains);

        ads.load_str("shared.example.com\nads.example.com\n", store.as_ref());
        trackers.load_str("shared.example.com\n", store.as_ref());
        ads.load_str("", store.as_ref());

        assert!(store.block("shared.example.com"));
        assert!(!store.block("ads.example.com"));
    }

    #[tokio::test]
    async fn watch_loads_file_and_follows_changes() {
        let path = std::env::temp_dir().join(format!("sinkhole-blocklist-{}", std::process::id()));
        tokio::fs::write(&path, "ads.example.com\n").await.unwrap();

        let store = new_store(StoreBackend::Trie);
        let handle = Blocklist::new(&path, ListFormat::Domains)
            .watch(store.clone(), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.block("ads.example.com"));

        // mtime granularity can be coarse; make sure the change is visible
        tokio::time::sleep(Duration::from_millis(1100)).await;
        tokio::fs::write(&path, "tracker.example.net\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!store.block("ads.example.com"));
        assert!(store.block("tracker.example.net"));

        handle.abort();
        let _ = tokio::fs::remove_file(&path).await;
    }
}
