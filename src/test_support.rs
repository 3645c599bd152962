//! Shared fixtures for unit tests: a connection wired to an in-memory
//! client, and throwaway TLS material.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, ServerName};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};
use tokio_rustls::TlsConnector;

use crate::auth::Credentials;
use crate::client::Connection;
use crate::config::{ServerConfig, TlsSettings};
use crate::server::ServerContext;
use crate::storage::LocalDriver;
use crate::tls::SecurityConfig;
use crate::transfer::Backoff;

pub struct TlsFixture {
    _dir: TempDir,
    key: PathBuf,
    cert: PathBuf,
    cert_der: CertificateDer<'static>,
}

impl TlsFixture {
    /// A self-signed certificate for `localhost`, written to PEM files.
    pub fn generate() -> Self {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key.pem");
        let cert = dir.path().join("cert.pem");
        std::fs::write(&key, generated.key_pair.serialize_pem()).unwrap();
        std::fs::write(&cert, generated.cert.pem()).unwrap();

        Self {
            _dir: dir,
            key,
            cert,
            cert_der: CertificateDer::from(generated.cert.der().to_vec()),
        }
    }

    pub fn settings(&self) -> TlsSettings {
        TlsSettings {
            private_key_file: Some(self.key.to_string_lossy().into_owned()),
            cert_chain_file: Some(self.cert.to_string_lossy().into_owned()),
            ..TlsSettings::default()
        }
    }

    pub fn security(&self) -> SecurityConfig {
        SecurityConfig::with_support(&self.settings(), true).unwrap()
    }

    /// A client connector trusting only this certificate.
    pub fn connector(&self) -> TlsConnector {
        let mut roots = RootCertStore::empty();
        roots.add(self.cert_der.clone()).unwrap();
        let config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }

    pub fn server_name() -> ServerName<'static> {
        ServerName::try_from("localhost").unwrap()
    }
}

/// A connection whose control channel is an in-memory pipe. `client` is the
/// other end.
pub struct Harness {
    pub conn: Connection,
    pub client: BufReader<DuplexStream>,
    root: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_security(SecurityConfig::disabled())
    }

    pub fn with_security(security: SecurityConfig) -> Self {
        let root = tempfile::tempdir().unwrap();
        let credentials: Credentials = [("alice".to_string(), "alice123".to_string())]
            .into_iter()
            .collect();
        let driver = LocalDriver::new(root.path(), credentials);
        let context = ServerContext::new(ServerConfig::default(), security, Arc::new(driver))
            .with_backoff(Backoff::new(
                Duration::from_millis(5),
                Duration::from_millis(320),
            ));
        Self::with_context(context, root)
    }

    pub fn with_context(context: ServerContext, root: TempDir) -> Self {
        let (server, client) = tokio::io::duplex(64 * 1024);
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let local: SocketAddr = "127.0.0.1:2121".parse().unwrap();
        Self {
            conn: Connection::new(Box::new(server), peer, local, Arc::new(context)),
            client: BufReader::new(client),
            root,
        }
    }

    /// A harness whose session has already authenticated as `alice`.
    pub fn logged_in() -> Self {
        let mut harness = Self::new();
        harness.conn.session.set_requested_user("alice".into());
        harness.conn.session.login();
        harness
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Reads one reply line with the terminator removed.
    pub async fn reply(&mut self) -> String {
        let mut line = String::new();
        self.client.read_line(&mut line).await.unwrap();
        line.trim_end_matches(['\r', '\n']).to_string()
    }
}
