use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

// -----------------------------------------------------------------------------
// ----- TLS: Exported ---------------------------------------------------------

/// Build the server-side acceptor from PEM files. Offers h2 and http/1.1.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, String> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("unsupported tls protocol versions: {e}"))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| format!("invalid tls key/cert pair: {e}"))?;

    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    Ok(TlsAcceptor::from(Arc::new(config)))
}

// -----------------------------------------------------------------------------
// ----- TLS: Private helpers --------------------------------------------------

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, String> {
    let file =
        File::open(path).map_err(|e| format!("failed to open tls cert {}: {e}", path.display()))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("failed to read tls cert {}: {e}", path.display()))?;

    if certs.is_empty() {
        return Err(format!("no certificates found in {}", path.display()));
    }

    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, String> {
    let file =
        File::open(path).map_err(|e| format!("failed to open tls key {}: {e}", path.display()))?;
    let mut reader = BufReader::new(file);
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|e| format!("failed to read tls key {}: {e}", path.display()))?
        .ok_or_else(|| format!("no private key found in {}", path.display()))?;

    Ok(key)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
