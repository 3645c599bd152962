use log::{error, info};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::client::handle_client;
use crate::config::ServerConfig;
use crate::error::{FtpServerError, handle_error};
use crate::protocol::Dispatcher;
use crate::storage::Driver;
use crate::tls::SecurityConfig;
use crate::transfer::{Backoff, Waiter, waiter_for};

/// Everything a connection shares with the rest of the server. Built once
/// at startup and read-only afterwards.
pub struct ServerContext {
    pub config: ServerConfig,
    pub security: SecurityConfig,
    pub driver: Arc<dyn Driver>,
    pub waiter: Arc<dyn Waiter>,
    pub backoff: Backoff,
    pub dispatcher: Dispatcher,
}

impl ServerContext {
    pub fn new(config: ServerConfig, security: SecurityConfig, driver: Arc<dyn Driver>) -> Self {
        let waiter = waiter_for(config.data_channel.waiter);
        let backoff = Backoff::from_settings(&config.data_channel);
        let dispatcher = Dispatcher::new(security.tls_supported());
        Self {
            config,
            security,
            driver,
            waiter,
            backoff,
            dispatcher,
        }
    }

    /// Replaces the readiness backoff derived from the configuration.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
}

impl Server {
    /// Binds the control socket named by the configuration.
    pub async fn bind(context: ServerContext) -> io::Result<Self> {
        let socket = context.config.control_socket();
        let listener = match TcpListener::bind(&socket).await {
            Ok(listener) => {
                info!("Server bound to {}", socket);
                listener
            }
            Err(e) => {
                error!("Failed to bind to {}: {}", socket, e);
                return Err(e);
            }
        };

        Ok(Self {
            listener,
            context: Arc::new(context),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts control connections forever. Each client runs in its own
    /// task; a panic in one is logged as a handler fault and only closes
    /// that client's connection.
    pub async fn run(self) {
        info!(
            "Starting FTP server on {} (TLS {})",
            self.context.config.control_socket(),
            if self.context.security.valid_tls_config() {
                "available"
            } else {
                "unavailable"
            }
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let local = match stream.local_addr() {
                        Ok(local) => local,
                        Err(e) => {
                            error!("Failed to read local address for {}: {}", peer, e);
                            continue;
                        }
                    };
                    info!("Accepted connection from {}", peer);

                    let context = Arc::clone(&self.context);
                    // Spawn a task for each client so accept loop doesn't block
                    let session = tokio::spawn(async move {
                        handle_client(Box::new(stream), peer, local, context).await;
                    });
                    tokio::spawn(async move {
                        match session.await {
                            Err(e) if e.is_panic() => {
                                let fault = FtpServerError::HandlerFault(e.to_string());
                                handle_error(&peer.to_string(), &fault);
                            }
                            _ => {}
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}
