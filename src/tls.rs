//! TLS wiring: a `rustls::ServerConfig` whose certificate resolution is delegated to a
//! per-[`Socket`][crate::Socket] [`Certs`] registry via SNI.

use crate::error::{Result, ServerError};
use crate::sni::Certs;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use std::sync::Arc;

/// Parse a PEM certificate chain and private key into a signing-ready [`CertifiedKey`].
pub(crate) fn build_certified_key(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<CertifiedKey>> {
    let cert_chain: Vec<_> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| ServerError::CertificateInvalid(e.to_string()))?;
    if cert_chain.is_empty() {
        return Err(ServerError::CertificateInvalid(
            "no certificate found in PEM input".into(),
        ));
    }

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::KeyInvalid(e.to_string()))?
        .ok_or_else(|| ServerError::KeyInvalid("no private key found in PEM input".into()))?;

    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| ServerError::KeyInvalid(e.to_string()))?;

    Ok(Arc::new(CertifiedKey::new(cert_chain, signing_key)))
}

/// A [`ResolvesServerCert`] that asks a [`Certs`] registry to resolve the ClientHello's SNI
/// hostname, falling back to the registry's catch-all entry when the handshake carries no SNI.
#[derive(Debug)]
struct SniCertResolver {
    certs: Arc<Certs>,
}

impl std::fmt::Debug for Certs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certs").finish_non_exhaustive()
    }
}

impl SniCertResolver {
    fn new(certs: Arc<Certs>) -> Self {
        Self { certs }
    }
}

impl ResolvesServerCert for SniCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let hostname = client_hello.server_name().unwrap_or("");
        self.certs.resolve(hostname).map(|entry| entry.0)
    }
}

/// Build a `ServerConfig` that resolves certificates through `certs` for every handshake on this
/// socket. Installs the `ring` crypto provider process-wide on first call; later calls are
/// harmless no-ops.
pub(crate) fn build_server_config(certs: Arc<Certs>) -> Result<crate::ServerTlsConfig> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(SniCertResolver::new(certs)));
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}
