//! TLS support
//!
//! Security configuration and the stream type shared by control and data
//! connections.

pub mod config;
pub mod stream;

pub use config::SecurityConfig;
pub use stream::{AsyncIo, BoxedIo, MaybeTls, Prefixed};

/// Whether this build can speak TLS at all.
pub fn tls_supported() -> bool {
    !rustls::crypto::ring::default_provider()
        .cipher_suites
        .is_empty()
}
