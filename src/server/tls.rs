//! TLS contexts for the listener and the query client.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::crypto::ring::default_provider;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::info;

use crate::config::TlsConfig;
use crate::error::{Error, Result};

const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// Read every certificate from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| Error::Tls(format!("failed to open {}: {}", path.display(), e)))?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("invalid PEM in {}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Read a private key from a PEM file, decrypting it with `password` when
/// it is an encrypted PKCS#8 key.
pub fn load_private_key(path: &Path, password: Option<&str>) -> Result<PrivateKeyDer<'static>> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| Error::Tls(format!("failed to read {}: {}", path.display(), e)))?;

    if pem.contains(&format!("-----BEGIN {}-----", ENCRYPTED_KEY_LABEL)) {
        let password = password.ok_or_else(|| {
            Error::Tls(format!(
                "{} is encrypted but no key password was given",
                path.display()
            ))
        })?;
        return decrypt_pkcs8(&pem, password)
            .map_err(|e| Error::Tls(format!("failed to decrypt {}: {}", path.display(), e)));
    }

    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| Error::Tls(format!("invalid PEM in {}: {}", path.display(), e)))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {}", path.display())))
}

fn decrypt_pkcs8(pem: &str, password: &str) -> std::result::Result<PrivateKeyDer<'static>, String> {
    let (label, document) = pkcs8::der::Document::from_pem(pem).map_err(|e| e.to_string())?;
    if label != ENCRYPTED_KEY_LABEL {
        return Err(format!("unexpected PEM label {:?}", label));
    }

    let encrypted =
        pkcs8::EncryptedPrivateKeyInfo::try_from(document.as_bytes()).map_err(|e| e.to_string())?;
    let secret = encrypted.decrypt(password).map_err(|e| e.to_string())?;

    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        secret.as_bytes().to_vec(),
    )))
}

/// Build the server-side TLS acceptor from the configured certificate
/// chain, private key and key passphrase.
pub fn build_acceptor(tls: &TlsConfig) -> Result<TlsAcceptor> {
    let certfile = tls
        .certfile
        .as_deref()
        .ok_or_else(|| Error::Tls("certfile is not configured".to_string()))?;
    let keyfile = tls
        .keyfile
        .as_deref()
        .ok_or_else(|| Error::Tls("keyfile is not configured".to_string()))?;

    let certs = load_certs(certfile)?;
    let key = load_private_key(keyfile, tls.key_password.as_deref())?;

    let config = ServerConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Tls(format!("certificate and key do not form a usable pair: {}", e)))?;

    info!("TLS enabled with certificate chain {:?}", certfile);
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build a client-side connector that trusts the certificates in `ca_file`.
pub fn build_connector(ca_file: &Path) -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_file)? {
        roots
            .add(cert)
            .map_err(|e| Error::Tls(format!("invalid CA certificate: {}", e)))?;
    }

    let config = ClientConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}
