pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod navigate;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod tls;
pub mod transfer;

#[cfg(test)]
mod test_support;

pub use config::ServerConfig;
pub use server::{Server, ServerContext};
