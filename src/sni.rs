use crate::error::{Result, ServerError};
use std::collections::HashMap;
use std::sync::Mutex;

/// The maximum hostname length accepted from a TLS ClientHello's SNI extension.
pub const MAX_HOSTNAME_LEN: usize = 255;

/// An imported certificate/private-key pair, opaque to everything but the TLS wiring in
/// [`crate::tls`].
#[cfg(feature = "tls")]
#[derive(Clone)]
pub struct CertEntry(pub(crate) std::sync::Arc<rustls::sign::CertifiedKey>);

#[cfg(not(feature = "tls"))]
#[derive(Clone)]
pub struct CertEntry(pub(crate) std::sync::Arc<(Vec<u8>, Vec<u8>)>);

/// A per-[`Socket`][crate::Socket] registry of hostname patterns to certificates, consulted from
/// the TLS handshake's SNI callback.
///
/// pattern grammar: an exact hostname (`"example.com"`), a wildcard (`"*.example.com"`), or the
/// empty string, which matches any hostname and is chosen only if nothing more specific matches.
#[derive(Default)]
pub struct Certs {
    entries: Mutex<HashMap<String, CertEntry>>,
}

impl Certs {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a pattern -> cert/key binding, built eagerly so import failures surface here
    /// rather than at handshake time.
    #[cfg(feature = "tls")]
    pub fn add(&self, pattern: &str, cert_pem: &[u8], key_pem: &[u8]) -> Result<()> {
        let certified_key = crate::tls::build_certified_key(cert_pem, key_pem)?;
        self.entries
            .lock()
            .unwrap()
            .insert(pattern.to_string(), CertEntry(certified_key));
        Ok(())
    }

    #[cfg(not(feature = "tls"))]
    #[allow(missing_docs)]
    pub fn add(&self, pattern: &str, cert_pem: &[u8], key_pem: &[u8]) -> Result<()> {
        if cert_pem.is_empty() {
            return Err(ServerError::CertificateInvalid("empty certificate".into()));
        }
        if key_pem.is_empty() {
            return Err(ServerError::KeyInvalid("empty private key".into()));
        }
        self.entries.lock().unwrap().insert(
            pattern.to_string(),
            CertEntry(std::sync::Arc::new((cert_pem.to_vec(), key_pem.to_vec()))),
        );
        Ok(())
    }

    /// Resolve a hostname against the registry.
    ///
    /// an exact match always wins; otherwise the longest matching wildcard pattern wins; the
    /// empty catch-all pattern is used only when nothing else matched. `None` means the
    /// handshake should be rejected.
    pub fn resolve(&self, hostname: &str) -> Option<CertEntry> {
        if hostname.len() > MAX_HOSTNAME_LEN {
            return None;
        }
        let entries = self.entries.lock().unwrap();

        if let Some(entry) = entries.get(hostname) {
            return Some(entry.clone());
        }

        let mut best: Option<(&str, &CertEntry)> = None;
        for (pattern, entry) in entries.iter() {
            if !pattern.starts_with('*') {
                continue;
            }
            let suffix = &pattern[1..];
            if hostname.len() >= suffix.len() && hostname.ends_with(suffix) {
                if best.is_none_or(|(p, _)| pattern.len() > p.len()) {
                    best = Some((pattern.as_str(), entry));
                }
            }
        }
        if let Some((_, entry)) = best {
            return Some(entry.clone());
        }

        entries.get("").cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[cfg(not(feature = "tls"))]
    #[test]
    fn exact_match_wins_over_wildcard() {
        let certs = Certs::new();
        certs.add("example.com", b"cert1", b"key1").unwrap();
        certs.add("*.example.com", b"cert2", b"key2").unwrap();
        let resolved = certs.resolve("example.com").unwrap();
        assert_eq!(&*resolved.0 .0, b"cert1");
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn longest_wildcard_wins() {
        let certs = Certs::new();
        certs.add("example.com", b"c1", b"k1").unwrap();
        certs.add("*.example.com", b"c2", b"k2").unwrap();
        certs.add("*.com", b"c3", b"k3").unwrap();

        assert_eq!(&*certs.resolve("a.example.com").unwrap().0 .0, b"c2");
        assert_eq!(&*certs.resolve("example.com").unwrap().0 .0, b"c1");
        assert_eq!(&*certs.resolve("foo.com").unwrap().0 .0, b"c3");
        assert!(certs.resolve("other.org").is_none());
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn catch_all_only_applies_if_nothing_else_matches() {
        let certs = Certs::new();
        certs.add("", b"default-cert", b"default-key").unwrap();
        certs.add("example.com", b"specific-cert", b"specific-key").unwrap();
        assert_eq!(&*certs.resolve("example.com").unwrap().0 .0, b"specific-cert");
        assert_eq!(&*certs.resolve("anything.else").unwrap().0 .0, b"default-cert");
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn overlong_hostname_is_rejected() {
        let certs = Certs::new();
        certs.add("", b"c", b"k").unwrap();
        let long = "a".repeat(300);
        assert!(certs.resolve(&long).is_none());
    }
}
