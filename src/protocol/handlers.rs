//! Command handlers module for the FTP server.
//!
//! This module defines handler functions for FTP commands: authentication,
//! navigation, file operations through the storage driver, data channel
//! setup and the assorted utility commands. Security negotiation lives in
//! the security middleware, which runs before these handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::{error, info, warn};

use crate::client::{Connection, TransferType};
use crate::error::{FtpServerError, ProtocolError, StorageError, TransferError, storage_error_to_reply};
use crate::middleware::CommandHandler;
use crate::navigate::split_name;
use crate::protocol::responses::{feat_reply, help_reply};
use crate::protocol::{Request, Verb};
use crate::transfer::{
    Payload, Received, epsv_reply, parse_eprt, parse_port, pasv_reply, receive_outofband_data,
    send_outofband_data, wait_for_upload,
};

const STOU_ATTEMPTS: usize = 16;

static STOU_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The terminal handler for every whitelisted command.
pub struct BaseCommands;

#[async_trait]
impl CommandHandler for BaseCommands {
    async fn handle(&self, conn: &mut Connection, request: &Request) -> Result<(), FtpServerError> {
        let param = request.param.as_deref();
        let Some(verb) = request.verb else {
            return handle_cmd_unknown(conn, request).await;
        };

        match verb {
            Verb::Quit => handle_cmd_quit(conn).await,
            Verb::User => handle_cmd_user(conn, param).await,
            Verb::Pass => handle_cmd_pass(conn, param).await,
            Verb::Pwd | Verb::Xpwd => handle_cmd_pwd(conn).await,
            Verb::Cwd | Verb::Xcwd => handle_cmd_cwd(conn, param).await,
            Verb::Cdup | Verb::Xcup => handle_cmd_cwd(conn, Some("..")).await,
            Verb::List => handle_cmd_list(conn, param, true).await,
            Verb::Nlst => handle_cmd_list(conn, param, false).await,
            Verb::Retr => handle_cmd_retr(conn, param).await,
            Verb::Size => handle_cmd_size(conn, param).await,
            Verb::Stor => handle_cmd_stor(conn, param, false).await,
            Verb::Appe => handle_cmd_stor(conn, param, true).await,
            Verb::Stou => handle_cmd_stou(conn).await,
            Verb::Dele => handle_cmd_dele(conn, param).await,
            Verb::Mkd => handle_cmd_mkd(conn, param).await,
            Verb::Rmd | Verb::Xrmd => handle_cmd_rmd(conn, param).await,
            Verb::Rnfr => handle_cmd_rnfr(conn, param).await,
            Verb::Rnto => handle_cmd_rnto(conn, param).await,
            Verb::Rest => handle_cmd_rest(conn, param).await,
            Verb::Pasv => handle_cmd_pasv(conn, false).await,
            Verb::Epsv => handle_cmd_pasv(conn, true).await,
            Verb::Port => handle_cmd_port(conn, param, false).await,
            Verb::Eprt => handle_cmd_port(conn, param, true).await,
            Verb::Type => handle_cmd_type(conn, param).await,
            Verb::Mode => handle_cmd_mode(conn, param).await,
            Verb::Stru => handle_cmd_stru(conn, param).await,
            Verb::Syst => handle_cmd_syst(conn).await,
            Verb::Feat => {
                let reply = feat_reply(conn.server.security.tls_supported());
                conn.respond_raw(&reply).await
            }
            Verb::Help => {
                let reply = help_reply(conn.server.dispatcher.whitelist());
                conn.respond_raw(&reply).await
            }
            Verb::Noop => conn.respond("200").await,
            Verb::Allo => conn.respond("202 Obsolete").await,
            // negotiated by the security middleware
            Verb::Auth | Verb::Pbsz | Verb::Prot => handle_cmd_unknown(conn, request).await,
        }
    }
}

async fn handle_cmd_unknown(conn: &mut Connection, request: &Request) -> Result<(), FtpServerError> {
    conn.reject(ProtocolError::UnknownCommand(request.name.to_uppercase()))
        .await
}

/// Handles QUIT: drops the data channel and ends the session once the reply
/// is flushed.
async fn handle_cmd_quit(conn: &mut Connection) -> Result<(), FtpServerError> {
    conn.data.close();
    conn.respond("221 Bye").await?;
    conn.session.abort();
    info!("Client {} requested to quit", conn.peer());
    Ok(())
}

// --------------------
// Authentication
// --------------------

async fn handle_cmd_user(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if conn.session.is_logged_in() {
        return conn.respond("500 Already logged in").await;
    }
    let Some(user) = conn.require_param(param).await? else {
        return Ok(());
    };
    conn.session.set_requested_user(user.to_string());
    conn.respond("331 OK, password required").await
}

/// Handles PASS: asks the driver to authenticate the user named by USER.
async fn handle_cmd_pass(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if conn.session.is_logged_in() {
        return conn.respond("202 User already logged in").await;
    }
    let Some(password) = conn.require_param(param).await? else {
        return Ok(());
    };
    let Some(user) = conn.session.requested_user().map(str::to_string) else {
        return conn.respond("530 password with no username").await;
    };

    let driver = Arc::clone(&conn.server.driver);
    match driver.authenticate(&user, password).await {
        Ok(()) => {
            conn.session.login();
            info!("Client {} logged in as {}", conn.peer(), user);
            conn.respond("230 OK, password correct").await
        }
        Err(e) => {
            warn!("Failed login from {}: {}", conn.peer(), e);
            conn.respond("530 incorrect login. not logged in.").await
        }
    }
}

// --------------------
// Navigation
// --------------------

async fn handle_cmd_pwd(conn: &mut Connection) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let reply = format!("257 \"{}\" is the current directory", conn.session.name_prefix());
    conn.respond(&reply).await
}

async fn handle_cmd_cwd(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let path = conn.build_path(param);
    let driver = Arc::clone(&conn.server.driver);
    match driver.change_dir(&path).await {
        Ok(()) => {
            let reply = format!("250 Directory changed to {}", path);
            conn.session.set_name_prefix(path);
            conn.respond(&reply).await
        }
        Err(e) => reply_storage_error(conn, "CWD", e).await,
    }
}

// --------------------
// Transfers
// --------------------

/// Handles LIST (long format) and NLST (names only) over the data channel.
async fn handle_cmd_list(
    conn: &mut Connection,
    param: Option<&str>,
    long: bool,
) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let path = conn.build_path(param);
    let driver = Arc::clone(&conn.server.driver);
    let items = match driver.dir_contents(&path).await {
        Ok(items) => items,
        Err(e) => {
            conn.data.close();
            return reply_storage_error(conn, "LIST", e).await;
        }
    };

    let lines = items
        .iter()
        .map(|item| if long { item.list_line() } else { item.name.clone() })
        .collect();
    send_outofband_data(conn, Payload::Lines(lines)).await?;
    Ok(())
}

/// Handles RETR, starting at the offset set by a preceding REST.
async fn handle_cmd_retr(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(name) = conn.require_param(param).await? else {
        return Ok(());
    };
    let path = conn.build_path(Some(name));
    let offset = conn.session.take_restart_offset();

    let driver = Arc::clone(&conn.server.driver);
    match driver.get_file(&path, offset).await {
        Ok(reader) => {
            info!("Client {} downloading {} from offset {}", conn.peer(), path, offset);
            send_outofband_data(conn, Payload::Reader(reader)).await?;
            Ok(())
        }
        Err(e) => {
            conn.data.close();
            reply_storage_error(conn, "RETR", e).await
        }
    }
}

async fn handle_cmd_size(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(name) = conn.require_param(param).await? else {
        return Ok(());
    };
    let path = conn.build_path(Some(name));
    let driver = Arc::clone(&conn.server.driver);
    match driver.bytes(&path).await {
        Ok(size) => conn.respond(&format!("213 {}", size)).await,
        Err(e) => reply_storage_error(conn, "SIZE", e).await,
    }
}

/// Handles STOR and APPE.
async fn handle_cmd_stor(
    conn: &mut Connection,
    param: Option<&str>,
    append: bool,
) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(name) = conn.require_param(param).await? else {
        return Ok(());
    };
    let path = conn.build_path(Some(name));

    if let Some(received) = store(conn, &path, append).await? {
        conn.respond(&format!(
            "226 Closing data connection, received {} bytes",
            received
        ))
        .await?;
    }
    Ok(())
}

/// Handles STOU: stores the upload under a generated name in the current
/// directory.
async fn handle_cmd_stou(conn: &mut Connection) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }

    let driver = Arc::clone(&conn.server.driver);
    let mut target = None;
    for _ in 0..STOU_ATTEMPTS {
        let candidate = conn.build_path(Some(&unique_name()));
        if let Err(StorageError::FileNotFound(_)) = driver.bytes(&candidate).await {
            target = Some(candidate);
            break;
        }
    }
    let Some(path) = target else {
        conn.data.close();
        return conn.respond("550 Action not taken").await;
    };

    if let Some(received) = store(conn, &path, false).await? {
        let name = split_name(&path).1.unwrap_or_default().to_string();
        conn.respond(&format!(
            "226 Closing data connection, received {} bytes, stored as {}",
            received, name
        ))
        .await?;
    }
    Ok(())
}

fn unique_name() -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    format!("ftp{}-{}", stamp, STOU_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Receives an upload into `path`. Returns the byte count when the upload
/// completed; in every other case the client has already been answered.
/// The file is only opened once the data connection exists.
async fn store(conn: &mut Connection, path: &str, append: bool) -> Result<Option<u64>, FtpServerError> {
    let Some(socket) = wait_for_upload(conn).await? else {
        return Ok(None);
    };

    let driver = Arc::clone(&conn.server.driver);
    let mut writer = match driver.put_file(path, append).await {
        Ok(writer) => writer,
        Err(e) => {
            conn.data.close();
            reply_storage_error(conn, "STOR", e).await?;
            return Ok(None);
        }
    };

    info!("Client {} uploading {} (append: {})", conn.peer(), path, append);
    match receive_outofband_data(conn, socket, &mut writer).await? {
        Received::Completed(received) => Ok(Some(received)),
        Received::Failed { received } => {
            warn!(
                "Upload of {} from {} failed after {} bytes",
                path,
                conn.peer(),
                received
            );
            conn.respond("550 Action not taken").await?;
            Ok(None)
        }
    }
}

// --------------------
// File and directory management
// --------------------

async fn handle_cmd_dele(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(name) = conn.require_param(param).await? else {
        return Ok(());
    };
    let path = conn.build_path(Some(name));
    let driver = Arc::clone(&conn.server.driver);
    match driver.delete_file(&path).await {
        Ok(()) => {
            info!("Client {} deleted {}", conn.peer(), path);
            conn.respond("250 File deleted").await
        }
        Err(e) => reply_storage_error(conn, "DELE", e).await,
    }
}

async fn handle_cmd_mkd(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(name) = conn.require_param(param).await? else {
        return Ok(());
    };
    let path = conn.build_path(Some(name));
    let driver = Arc::clone(&conn.server.driver);
    match driver.make_dir(&path).await {
        Ok(()) => conn.respond(&format!("257 \"{}\" created", path)).await,
        Err(e) => reply_storage_error(conn, "MKD", e).await,
    }
}

async fn handle_cmd_rmd(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(name) = conn.require_param(param).await? else {
        return Ok(());
    };
    let path = conn.build_path(Some(name));
    let driver = Arc::clone(&conn.server.driver);
    match driver.delete_dir(&path).await {
        Ok(()) => conn.respond("250 Directory deleted").await,
        Err(e) => reply_storage_error(conn, "RMD", e).await,
    }
}

async fn handle_cmd_rnfr(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(name) = conn.require_param(param).await? else {
        return Ok(());
    };
    let path = conn.build_path(Some(name));
    conn.session.set_rename_from(path);
    conn.respond("350 Requested file action pending further information.")
        .await
}

async fn handle_cmd_rnto(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(name) = conn.require_param(param).await? else {
        return Ok(());
    };
    let Some(from) = conn.session.take_rename_from() else {
        return conn
            .reject(ProtocolError::ProtocolStateViolation("RNFR required first"))
            .await;
    };
    let to = conn.build_path(Some(name));
    let driver = Arc::clone(&conn.server.driver);
    match driver.rename(&from, &to).await {
        Ok(()) => {
            info!("Client {} renamed {} to {}", conn.peer(), from, to);
            conn.respond("250 Rename successful").await
        }
        Err(e) => reply_storage_error(conn, "RNTO", e).await,
    }
}

async fn handle_cmd_rest(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(offset) = conn.require_param(param).await? else {
        return Ok(());
    };
    match offset.parse::<u64>() {
        Ok(offset) => {
            conn.session.set_restart_offset(offset);
            conn.respond(&format!("350 Restarting at {}. Send RETR to resume", offset))
                .await
        }
        Err(_) => conn.reject(ProtocolError::IllegalParameter).await,
    }
}

async fn reply_storage_error(
    conn: &mut Connection,
    command: &str,
    error: StorageError,
) -> Result<(), FtpServerError> {
    warn!("{} for client {} failed: {}", command, conn.peer(), error);
    conn.respond(&storage_error_to_reply(&error)).await
}

// --------------------
// Data channel setup
// --------------------

/// Handles PASV and EPSV: listens on the control connection's local address
/// with an OS-assigned port.
async fn handle_cmd_pasv(conn: &mut Connection, extended: bool) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }

    let tls = conn.data_tls();
    let (host, owner) = (conn.local().ip(), conn.peer().ip());
    let addr = match conn.data.start_passive(host, owner, tls).await {
        Ok(addr) => addr,
        Err(e) => {
            error!("Passive mode for {} failed: {}", conn.peer(), e);
            return conn.respond("425 Can't open passive connection").await;
        }
    };

    let reply = if extended {
        Some(epsv_reply(addr))
    } else {
        pasv_reply(addr)
    };
    match reply {
        Some(reply) => conn.respond(&reply).await,
        None => {
            conn.data.close();
            conn.respond("522 Network protocol not supported, use EPSV")
                .await
        }
    }
}

/// Handles PORT and EPRT: dials the client's data port.
async fn handle_cmd_port(
    conn: &mut Connection,
    param: Option<&str>,
    extended: bool,
) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(param) = conn.require_param(param).await? else {
        return Ok(());
    };

    let parsed = if extended {
        parse_eprt(param)
    } else {
        parse_port(param)
    };
    let target = match parsed {
        Ok(target) => target,
        Err(TransferError::UnsupportedAddressFamily(af)) => {
            warn!("Client {} requested address family {}", conn.peer(), af);
            return conn
                .respond("522 Network protocol not supported, use (1,2)")
                .await;
        }
        Err(_) => return conn.reject(ProtocolError::IllegalParameter).await,
    };

    let tls = conn.data_tls();
    let timeout = conn.server.config.data_channel.connect_timeout();
    match conn.data.open_active(target, tls, timeout).await {
        Ok(()) => {
            conn.respond(&format!("200 Connection established ({})", target.port()))
                .await
        }
        Err(e) => {
            warn!("Client {}: {}", conn.peer(), e);
            conn.respond("425 Data connection failed").await
        }
    }
}

// --------------------
// Transfer parameters
// --------------------

async fn handle_cmd_type(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(param) = conn.require_param(param).await? else {
        return Ok(());
    };
    let code = param.split_whitespace().next().unwrap_or_default();
    if code.eq_ignore_ascii_case("A") {
        conn.session.set_transfer_type(TransferType::Ascii);
        conn.respond("200 Type set to ASCII").await
    } else if code.eq_ignore_ascii_case("I") {
        conn.session.set_transfer_type(TransferType::Binary);
        conn.respond("200 Type set to binary").await
    } else {
        conn.reject(ProtocolError::UnsupportedOption("TYPE".into()))
            .await
    }
}

async fn handle_cmd_mode(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    let Some(param) = conn.require_param(param).await? else {
        return Ok(());
    };
    if param.eq_ignore_ascii_case("S") {
        conn.respond("200 OK").await
    } else {
        conn.reject(ProtocolError::UnsupportedOption("MODE".into()))
            .await
    }
}

async fn handle_cmd_stru(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    let Some(param) = conn.require_param(param).await? else {
        return Ok(());
    };
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    if param.eq_ignore_ascii_case("F") {
        conn.respond("200 OK").await
    } else {
        conn.reject(ProtocolError::UnsupportedOption("STRU".into()))
            .await
    }
}

async fn handle_cmd_syst(conn: &mut Connection) -> Result<(), FtpServerError> {
    if !conn.ensure_logged_in().await? {
        return Ok(());
    }
    conn.respond("215 UNIX Type: L8").await
}
