//! Module `control`
//!
//! Line framing and replies on the control connection, plus the in-place
//! TLS upgrade performed by AUTH TLS.

use std::io;

use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio_rustls::TlsAcceptor;

use crate::error::TlsError;
use crate::tls::{BoxedIo, MaybeTls, Prefixed};

pub type ControlStream = MaybeTls<BoxedIo>;

/// One read from the control connection.
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    /// A command line with the terminator removed.
    Command(String),
    /// The line exceeded the length limit and was discarded.
    TooLong,
    Closed,
}

pub struct ControlChannel {
    // taken while the TLS handshake owns the stream
    stream: Option<BufReader<ControlStream>>,
}

impl ControlChannel {
    pub fn new(io: BoxedIo) -> Self {
        Self {
            stream: Some(BufReader::new(MaybeTls::Plain(io))),
        }
    }

    fn stream(&mut self) -> io::Result<&mut BufReader<ControlStream>> {
        self.stream.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "control connection closed")
        })
    }

    pub fn is_secure(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|stream| stream.get_ref().is_secure())
    }

    /// Reads the next `\n`-terminated line. Lines longer than `limit` bytes
    /// (excluding the terminator) are consumed and reported as
    /// [`Line::TooLong`].
    pub async fn read_line(&mut self, limit: usize) -> io::Result<Line> {
        let stream = self.stream()?;
        let bound = limit as u64 + 2;

        let mut buf = Vec::new();
        let n = (&mut *stream)
            .take(bound)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(Line::Closed);
        }

        if buf.last() != Some(&b'\n') && buf.len() as u64 == bound {
            let mut scratch = Vec::new();
            loop {
                scratch.clear();
                let n = (&mut *stream)
                    .take(4096)
                    .read_until(b'\n', &mut scratch)
                    .await?;
                if n == 0 || scratch.last() == Some(&b'\n') {
                    break;
                }
            }
            return Ok(Line::TooLong);
        }

        let text = String::from_utf8_lossy(&buf);
        let text = text.trim_end_matches(['\r', '\n']);
        if text.len() > limit {
            return Ok(Line::TooLong);
        }
        Ok(Line::Command(text.to_string()))
    }

    /// Sends one reply line, appending `\r\n`.
    pub async fn send_response(&mut self, reply: &str) -> io::Result<()> {
        let stream = self.stream()?.get_mut();
        stream.write_all(reply.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await
    }

    /// Sends pre-formatted text as is.
    pub async fn send_raw(&mut self, text: &str) -> io::Result<()> {
        let stream = self.stream()?.get_mut();
        stream.write_all(text.as_bytes()).await?;
        stream.flush().await
    }

    /// Runs the server side of a TLS handshake on the open connection. Bytes
    /// the client sent after the AUTH line are fed to the handshake. On
    /// failure the connection is unusable and must be dropped.
    pub async fn start_tls(&mut self, acceptor: &TlsAcceptor) -> Result<(), TlsError> {
        let stream = self.stream.take().ok_or_else(|| {
            TlsError::Handshake(io::Error::new(
                io::ErrorKind::NotConnected,
                "control connection closed",
            ))
        })?;

        let buffered = stream.buffer().to_vec();
        let io: BoxedIo = match stream.into_inner() {
            MaybeTls::Plain(io) => io,
            secure @ MaybeTls::Tls(_) => {
                self.stream = Some(BufReader::new(secure));
                return Err(TlsError::Config(
                    "control connection is already secure".into(),
                ));
            }
        };

        let io: BoxedIo = if buffered.is_empty() {
            io
        } else {
            debug!("Replaying {} buffered bytes into the TLS handshake", buffered.len());
            Box::new(Prefixed::new(buffered, io))
        };

        let tls = acceptor.accept(io).await.map_err(TlsError::Handshake)?;
        self.stream = Some(BufReader::new(MaybeTls::Tls(Box::new(tls))));
        Ok(())
    }

    /// Flushes and closes the connection. Later writes fail.
    pub async fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.get_mut().shutdown().await {
                debug!("Control connection shutdown failed: {}", e);
            }
        }
    }
}
