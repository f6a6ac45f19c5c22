//! TLS certificate loading for the listener.
use anyhow::Context;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Loads a rustls server config from PEM-encoded certificate and key files.
///
/// ALPN advertises both h2 and http/1.1 so the single listener keeps serving
/// both protocols when TLS is enabled.
pub fn load(cert: &Path, key: &Path) -> anyhow::Result<rustls::ServerConfig> {
    let mut cert_reader = BufReader::new(
        File::open(cert).with_context(|| format!("failed to open '{}'", cert.display()))?,
    );
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to read certificates from '{}'", cert.display()))?;

    let mut key_reader = BufReader::new(
        File::open(key).with_context(|| format!("failed to open '{}'", key.display()))?,
    );
    let key = rustls_pemfile::private_key(&mut key_reader)
        .with_context(|| format!("failed to read private key from '{}'", key.display()))?
        .with_context(|| format!("no private key found in '{}'", key.display()))?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid certificate or key")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}
