use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::client::Connection;
use crate::client::control::Line;
use crate::protocol::responses::greeting;
use crate::server::ServerContext;
use crate::tls::BoxedIo;

/// Handles one FTP control connection until the client quits, disconnects
/// or a command fails fatally.
///
/// - Sends the greeting.
/// - Reads `\r\n`-terminated command lines, rejecting overlong ones.
/// - Dispatches each line in order through the server's dispatcher.
pub async fn handle_client(
    io: BoxedIo,
    peer: SocketAddr,
    local: SocketAddr,
    server: Arc<ServerContext>,
) {
    let mut conn = Connection::new(io, peer, local, Arc::clone(&server));
    let limit = server.config.max_command_length;

    let welcome = greeting(server.config.server_name.as_deref());
    if let Err(e) = conn.respond(&welcome).await {
        error!("Failed to greet {}: {}", peer, e);
        return;
    }

    while !conn.session.is_aborted() {
        match conn.control.read_line(limit).await {
            Ok(Line::Command(line)) => server.dispatcher.dispatch(&mut conn, &line).await,
            Ok(Line::TooLong) => {
                warn!("Client {} sent a command longer than {} bytes", peer, limit);
                if conn.respond("500 Command too long").await.is_err() {
                    break;
                }
            }
            Ok(Line::Closed) => {
                info!("Connection closed by client {}", peer);
                break;
            }
            Err(e) => {
                error!("Failed to read from {}: {}", peer, e);
                break;
            }
        }
    }

    conn.close().await;
    info!("Client {} disconnected", peer);
}
