//! RAX FTPS Server - Entry Point
//!
//! An FTP server with RFC 4217 (AUTH TLS) support serving a local directory.

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};

use rax_ftps::auth::Credentials;
use rax_ftps::storage::LocalDriver;
use rax_ftps::tls::SecurityConfig;
use rax_ftps::{Server, ServerConfig, ServerContext};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    info!("Launching FTP server...");

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let security = match SecurityConfig::from_settings(&config.tls) {
        Ok(security) => security,
        Err(e) => {
            error!("TLS setup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let credentials = Credentials::new(config.users.clone());
    if credentials.is_empty() {
        info!("No users configured; every login will be refused");
    }
    let driver = LocalDriver::new(config.server_root_path(), credentials);
    if let Err(e) = driver.ensure_root().await {
        error!("Failed to create server root directory: {}", e);
        return ExitCode::FAILURE;
    }

    let context = ServerContext::new(config, security, Arc::new(driver));
    match Server::bind(context).await {
        Ok(server) => {
            server.run().await;
            ExitCode::SUCCESS
        }
        Err(_) => ExitCode::FAILURE,
    }
}
