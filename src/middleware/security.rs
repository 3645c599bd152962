//! Security middleware
//!
//! RFC 4217 negotiation (AUTH TLS, PBSZ, PROT) and the policies that reject
//! otherwise valid commands while the session is not secure enough.

use async_trait::async_trait;
use log::{info, warn};

use crate::client::Connection;
use crate::error::{FtpServerError, ProtocolError};
use crate::middleware::chain::{Interceptor, Next};
use crate::protocol::{Request, Verb};

pub struct SecurityInterceptor;

#[async_trait]
impl Interceptor for SecurityInterceptor {
    async fn intercept(
        &self,
        conn: &mut Connection,
        request: &Request,
        next: Next<'_>,
    ) -> Result<(), FtpServerError> {
        let param = request.param.as_deref();
        match request.verb {
            Some(Verb::Auth) => handle_cmd_auth(conn, param).await,
            Some(Verb::Pbsz) => handle_cmd_pbsz(conn, param).await,
            Some(Verb::Prot) => handle_cmd_prot(conn, param).await,
            Some(Verb::User) if reject_insecure_login(conn) => {
                conn.respond("521 This server enforces the use of AUTH TLS before log in")
                    .await
            }
            Some(verb) if verb.uses_data_channel() && reject_insecure_data_channel(conn) => {
                conn.respond("521 data connection cannot be opened with this PROT setting")
                    .await
            }
            Some(Verb::Port | Verb::Eprt) if conn.session.client_wants_secure_data_channel() => {
                conn.respond("521 sorry, my bad, but you have to use passive ftp with AUTH TLS for now")
                    .await
            }
            _ => next.run(conn, request).await,
        }
    }
}

fn reject_insecure_login(conn: &Connection) -> bool {
    conn.server.security.enforce_secure_command_channel() && !conn.session.is_command_channel_secure()
}

fn reject_insecure_data_channel(conn: &Connection) -> bool {
    conn.server.security.enforce_secure_data_channel()
        && !conn.session.client_wants_secure_data_channel()
}

/// Handles AUTH: upgrades the control connection in place. A failed
/// handshake leaves the connection unusable and is returned as an error.
async fn handle_cmd_auth(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    let Some(mechanism) = param else {
        return conn.reject(ProtocolError::MissingParameter).await;
    };
    if !mechanism.eq_ignore_ascii_case("TLS") {
        return conn.respond("534 Server only speaks AUTH TLS").await;
    }

    let acceptor = match conn.server.security.acceptor() {
        Some(acceptor) if conn.server.security.valid_tls_config() => acceptor.clone(),
        _ => {
            return conn
                .respond("431 Sorry, server is not configured for AUTH TLS")
                .await;
        }
    };
    if conn.session.is_command_channel_secure() {
        return conn
            .reject(ProtocolError::ProtocolStateViolation("AUTH TLS already negotiated"))
            .await;
    }

    conn.respond("234 OK, starting TLS on command channel").await?;
    conn.control.start_tls(&acceptor).await?;
    conn.session.tls_handshake_completed();
    info!("Client {} secured the command channel", conn.peer());
    Ok(())
}

async fn handle_cmd_pbsz(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    if param.is_none() {
        return conn.reject(ProtocolError::MissingParameter).await;
    }
    if !conn.session.record_pbsz() {
        return conn
            .reject(ProtocolError::ProtocolStateViolation("PBSZ needs AUTH TLS first"))
            .await;
    }
    conn.respond("200 PBSZ=0").await
}

async fn handle_cmd_prot(conn: &mut Connection, param: Option<&str>) -> Result<(), FtpServerError> {
    let Some(level) = param else {
        return conn.reject(ProtocolError::MissingParameter).await;
    };
    if !(conn.session.is_command_channel_secure() && conn.session.pbsz_seen()) {
        return conn
            .reject(ProtocolError::ProtocolStateViolation(
                "PROT needs AUTH TLS and PBSZ first",
            ))
            .await;
    }

    let private = match level.to_ascii_uppercase().as_str() {
        "C" => false,
        "P" => true,
        other => {
            warn!("Client {} requested unsupported PROT {}", conn.peer(), other);
            return conn
                .respond("534 only _C_LEAR and _P_RIVATE are allowed for TLS")
                .await;
        }
    };
    conn.session.set_secure_data_channel(private);

    let description = if private { "private" } else { "clear text" };
    conn.respond(&format!("200 {} data channel protection selected", description))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::chain::CommandHandler;
    use crate::protocol::parse_request;
    use crate::test_support::{Harness, TlsFixture};
    use crate::tls::SecurityConfig;
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncBufReadExt;

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    #[async_trait]
    impl CommandHandler for Recording {
        async fn handle(&self, _conn: &mut Connection, request: &Request) -> Result<(), FtpServerError> {
            self.0.lock().unwrap().push(request.name.clone());
            Ok(())
        }
    }

    impl Recording {
        fn seen(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    async fn run(harness: &mut Harness, handler: &Recording, line: &str) {
        let chain: Vec<Arc<dyn Interceptor>> = vec![Arc::new(SecurityInterceptor)];
        Next::new(&chain, handler)
            .run(&mut harness.conn, &parse_request(line))
            .await
            .unwrap();
    }

    fn enforcing(fixture: &TlsFixture, command: bool, data: bool) -> SecurityConfig {
        let mut settings = fixture.settings();
        settings.enforce_tls = command;
        settings.enforce_data_tls = data;
        SecurityConfig::with_support(&settings, true).unwrap()
    }

    #[tokio::test]
    async fn test_auth_replies() {
        let mut harness = Harness::new();
        let handler = Recording::default();

        run(&mut harness, &handler, "AUTH").await;
        assert_eq!(harness.reply().await, "553 action aborted, required param missing");

        run(&mut harness, &handler, "AUTH SSL").await;
        assert_eq!(harness.reply().await, "534 Server only speaks AUTH TLS");

        run(&mut harness, &handler, "AUTH TLS").await;
        assert_eq!(
            harness.reply().await,
            "431 Sorry, server is not configured for AUTH TLS"
        );
        assert!(!harness.conn.session.is_command_channel_secure());
        assert!(handler.seen().is_empty());
    }

    #[tokio::test]
    async fn test_auth_tls_secures_command_channel() {
        let fixture = TlsFixture::generate();
        let mut harness = Harness::with_security(fixture.security());
        let handler = Recording::default();
        let connector = fixture.connector();

        let Harness { conn, client, .. } = &mut harness;
        let chain: Vec<Arc<dyn Interceptor>> = vec![Arc::new(SecurityInterceptor)];
        let request = parse_request("auth tls");
        let (result, secured) = tokio::join!(Next::new(&chain, &handler).run(conn, &request), async {
            let mut line = String::new();
            client.read_line(&mut line).await.unwrap();
            assert_eq!(line, "234 OK, starting TLS on command channel\r\n");
            connector
                .connect(TlsFixture::server_name(), client.get_mut())
                .await
                .is_ok()
        });

        result.unwrap();
        assert!(secured);
        assert!(harness.conn.session.is_command_channel_secure());
        assert!(harness.conn.control.is_secure());
    }

    #[tokio::test]
    async fn test_pbsz_requires_secure_channel() {
        let mut harness = Harness::new();
        let handler = Recording::default();

        run(&mut harness, &handler, "PBSZ 0").await;
        assert_eq!(harness.reply().await, "503 PBSZ needs AUTH TLS first");

        harness.conn.session.tls_handshake_completed();
        run(&mut harness, &handler, "PBSZ 0").await;
        assert_eq!(harness.reply().await, "200 PBSZ=0");
        assert!(harness.conn.session.pbsz_seen());
    }

    #[tokio::test]
    async fn test_prot_levels() {
        let mut harness = Harness::new();
        let handler = Recording::default();
        harness.conn.session.tls_handshake_completed();

        run(&mut harness, &handler, "PROT P").await;
        assert_eq!(harness.reply().await, "503 PROT needs AUTH TLS and PBSZ first");

        run(&mut harness, &handler, "PBSZ 0").await;
        harness.reply().await;

        for level in ["S", "E"] {
            run(&mut harness, &handler, &format!("PROT {}", level)).await;
            assert_eq!(
                harness.reply().await,
                "534 only _C_LEAR and _P_RIVATE are allowed for TLS"
            );
        }

        run(&mut harness, &handler, "PROT C").await;
        assert_eq!(
            harness.reply().await,
            "200 clear text data channel protection selected"
        );
        assert!(!harness.conn.session.client_wants_secure_data_channel());

        run(&mut harness, &handler, "prot p").await;
        assert_eq!(
            harness.reply().await,
            "200 private data channel protection selected"
        );
        assert!(harness.conn.session.client_wants_secure_data_channel());
    }

    #[tokio::test]
    async fn test_enforced_login_needs_tls() {
        let fixture = TlsFixture::generate();
        let mut harness = Harness::with_security(enforcing(&fixture, true, false));
        let handler = Recording::default();

        run(&mut harness, &handler, "USER alice").await;
        assert_eq!(
            harness.reply().await,
            "521 This server enforces the use of AUTH TLS before log in"
        );
        assert!(handler.seen().is_empty());

        harness.conn.session.tls_handshake_completed();
        run(&mut harness, &handler, "USER alice").await;
        assert_eq!(handler.seen(), vec!["user"]);
    }

    #[tokio::test]
    async fn test_enforced_data_tls_blocks_transfers_until_prot_p() {
        let fixture = TlsFixture::generate();
        let mut harness = Harness::with_security(enforcing(&fixture, false, true));
        let handler = Recording::default();
        let transfers = ["STOR a", "RETR a", "LIST", "NLST", "STOU", "APPE a"];

        for line in transfers {
            run(&mut harness, &handler, line).await;
            assert_eq!(
                harness.reply().await,
                "521 data connection cannot be opened with this PROT setting"
            );
        }
        assert!(handler.seen().is_empty());

        harness.conn.session.tls_handshake_completed();
        harness.conn.session.record_pbsz();
        harness.conn.session.set_secure_data_channel(true);
        for line in transfers {
            run(&mut harness, &handler, line).await;
        }
        assert_eq!(
            handler.seen(),
            vec!["stor", "retr", "list", "nlst", "stou", "appe"]
        );
    }

    #[tokio::test]
    async fn test_active_mode_refused_with_private_data_channel() {
        let mut harness = Harness::new();
        let handler = Recording::default();
        harness.conn.session.tls_handshake_completed();
        harness.conn.session.record_pbsz();
        harness.conn.session.set_secure_data_channel(true);

        for line in ["PORT 127,0,0,1,19,136", "EPRT |1|127.0.0.1|5000|"] {
            run(&mut harness, &handler, line).await;
            assert_eq!(
                harness.reply().await,
                "521 sorry, my bad, but you have to use passive ftp with AUTH TLS for now"
            );
        }
        assert!(handler.seen().is_empty());
        assert!(harness.conn.data.current().is_none());
    }
}
