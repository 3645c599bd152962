//! Server-wide TLS settings for RFC 4217 (AUTH TLS, PBSZ, PROT).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::config::{TlsSettings, is_readable};
use crate::error::TlsError;

/// Immutable per-server security configuration, shared read-only by every
/// connection.
#[derive(Clone)]
pub struct SecurityConfig {
    enforce_tls: bool,
    enforce_data_tls: bool,
    private_key_file: Option<PathBuf>,
    cert_chain_file: Option<PathBuf>,
    tls_supported: bool,
    acceptor: Option<TlsAcceptor>,
}

impl SecurityConfig {
    /// Builds the security config for this build's TLS capabilities.
    pub fn from_settings(settings: &TlsSettings) -> Result<Self, TlsError> {
        Self::with_support(settings, super::tls_supported())
    }

    /// Builds the security config, treating TLS as available only when
    /// `tls_supported` is set.
    pub fn with_support(settings: &TlsSettings, tls_supported: bool) -> Result<Self, TlsError> {
        let private_key_file = settings.private_key_file.as_ref().map(PathBuf::from);
        let cert_chain_file = settings.cert_chain_file.as_ref().map(PathBuf::from);

        let acceptor = match (&private_key_file, &cert_chain_file) {
            (Some(key), Some(cert)) if tls_supported => {
                let key_pem = read_pem(key)?;
                let cert_pem = read_pem(cert)?;
                let config = build_server_config(&cert_pem, &key_pem)?;
                info!("TLS enabled with certificate {}", cert.display());
                Some(TlsAcceptor::from(config))
            }
            _ => None,
        };

        Ok(Self {
            enforce_tls: settings.enforce_tls,
            enforce_data_tls: settings.enforce_data_tls,
            private_key_file,
            cert_chain_file,
            tls_supported,
            acceptor,
        })
    }

    /// A config with no TLS material and no enforcement.
    pub fn disabled() -> Self {
        Self {
            enforce_tls: false,
            enforce_data_tls: false,
            private_key_file: None,
            cert_chain_file: None,
            tls_supported: super::tls_supported(),
            acceptor: None,
        }
    }

    pub fn enforce_secure_command_channel(&self) -> bool {
        self.enforce_tls
    }

    pub fn enforce_secure_data_channel(&self) -> bool {
        self.enforce_data_tls
    }

    pub fn tls_supported(&self) -> bool {
        self.tls_supported
    }

    /// True when TLS is supported and both PEM files are configured,
    /// readable and loaded.
    pub fn valid_tls_config(&self) -> bool {
        let readable = |path: &Option<PathBuf>| path.as_deref().is_some_and(is_readable);

        self.tls_supported
            && readable(&self.private_key_file)
            && readable(&self.cert_chain_file)
            && self.acceptor.is_some()
    }

    pub fn acceptor(&self) -> Option<&TlsAcceptor> {
        self.acceptor.as_ref()
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|e| TlsError::UnreadableFile(path.display().to_string(), e))
}

/// Builds a rustls server config from a PEM certificate chain and key.
pub fn build_server_config(
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    let certs = CertificateDer::pem_slice_iter(cert_pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Certificate(format!("failed to parse certificates: {e}")))?;
    if certs.is_empty() {
        return Err(TlsError::Certificate("no certificates found".into()));
    }

    let key = PrivateKeyDer::from_pem_slice(key_pem)
        .map_err(|e| TlsError::PrivateKey(format!("failed to parse private key: {e}")))?;

    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| TlsError::Config(e.to_string()))?
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| TlsError::Config(e.to_string()))?;

    Ok(Arc::new(config))
}
