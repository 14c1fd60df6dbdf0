//! Label-major host name keys.
//!
//! Block and override structures key their entries by the host name with its
//! labels reversed (`www.example.com` becomes `com.example.www`), so that a
//! domain and its subdomains share a common key prefix.

/// Reverse the labels of `host`.
///
/// Empty labels are preserved rather than rejected, so `example..com` becomes
/// `com..example`. Applying it twice yields the input again.
pub fn reverse_host(host: &str) -> String {
    if host.is_empty() {
        return String::new();
    }

    let mut key = String::with_capacity(host.len());
    for (i, label) in host.rsplit('.').enumerate() {
        if i > 0 {
            key.push('.');
        }
        key.push_str(label);
    }

    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_host_reorders_labels() {
        assert_eq!(reverse_host(""), "");
        assert_eq!(reverse_host("com"), "com");
        assert_eq!(reverse_host("example.com"), "com.example");
        assert_eq!(reverse_host("www.example.com"), "com.example.www");
        assert_eq!(reverse_host("sub.www.example.com"), "com.example.www.sub");
    }

    #[test]
    fn reverse_host_keeps_empty_labels() {
        assert_eq!(reverse_host("example..com"), "com..example");
        assert_eq!(reverse_host("example.com."), ".com.example");
    }

    #[test]
    fn reverse_host_is_its_own_inverse() {
        for host in ["a", "a.b", "ads.doubleclick.net", "x.y.z.w.example.org"] {
            assert_eq!(reverse_host(&reverse_host(host)), host);
        }
    }
}
