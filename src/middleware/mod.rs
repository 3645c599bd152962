//! Server middleware
//!
//! The interceptor chain every command passes through, with the logging and
//! RFC 4217 security interceptors.

pub mod chain;
pub mod logging;
pub mod security;

pub use chain::{CommandHandler, Interceptor, Next};
pub use logging::LoggingInterceptor;
pub use security::SecurityInterceptor;
