//! Client connection
//!
//! Everything one control connection owns: its session state, the control
//! channel, and at most one data channel.

use std::net::SocketAddr;
use std::sync::Arc;

use log::debug;
use tokio_rustls::TlsAcceptor;

use crate::client::control::ControlChannel;
use crate::client::state::Session;
use crate::error::{FtpServerError, ProtocolError, error_to_reply};
use crate::navigate::build_path;
use crate::server::ServerContext;
use crate::tls::BoxedIo;
use crate::transfer::DataChannel;

pub struct Connection {
    pub session: Session,
    pub control: ControlChannel,
    pub data: DataChannel,
    pub server: Arc<ServerContext>,
    peer: SocketAddr,
    local: SocketAddr,
}

impl Connection {
    pub fn new(io: BoxedIo, peer: SocketAddr, local: SocketAddr, server: Arc<ServerContext>) -> Self {
        Self {
            session: Session::default(),
            control: ControlChannel::new(io),
            data: DataChannel::new(),
            server,
            peer,
            local,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Address the client reached us on; passive listeners bind here.
    pub fn local(&self) -> SocketAddr {
        self.local
    }

    /// Sends a single-line reply.
    pub async fn respond(&mut self, reply: &str) -> Result<(), FtpServerError> {
        debug!("{} <- {}", self.peer, reply);
        self.control.send_response(reply).await?;
        Ok(())
    }

    /// Sends a pre-formatted multi-line reply.
    pub async fn respond_raw(&mut self, text: &str) -> Result<(), FtpServerError> {
        self.control.send_raw(text).await?;
        Ok(())
    }

    pub async fn reject(&mut self, error: ProtocolError) -> Result<(), FtpServerError> {
        self.respond(&error_to_reply(&error)).await
    }

    /// Replies `530` and returns false unless the session is logged in.
    pub async fn ensure_logged_in(&mut self) -> Result<bool, FtpServerError> {
        if self.session.is_logged_in() {
            return Ok(true);
        }
        self.reject(ProtocolError::Unauthenticated).await?;
        Ok(false)
    }

    /// Replies `553` and returns `None` when the parameter is missing.
    pub async fn require_param<'a>(
        &mut self,
        param: Option<&'a str>,
    ) -> Result<Option<&'a str>, FtpServerError> {
        if param.is_none() {
            self.reject(ProtocolError::MissingParameter).await?;
        }
        Ok(param)
    }

    /// Absolute virtual path for a client-supplied name.
    pub fn build_path(&self, name: Option<&str>) -> String {
        build_path(self.session.name_prefix(), name)
    }

    /// TLS acceptor for new data connections, present only after PROT P.
    pub fn data_tls(&self) -> Option<TlsAcceptor> {
        if self.session.client_wants_secure_data_channel() {
            self.server.security.acceptor().cloned()
        } else {
            None
        }
    }

    /// Closes the data channel, then the control connection after pending
    /// replies have been flushed.
    pub async fn close(&mut self) {
        self.data.close();
        self.control.shutdown().await;
    }
}
