//! Streaming over the data connection
//!
//! Outbound payloads (RETR, LIST, NLST) are copied in bounded chunks, each
//! write waiting for the peer to drain. Inbound uploads (STOR, APPE, STOU)
//! forward every chunk to the sink as it arrives.

use std::io::Cursor;
use std::sync::Arc;

use log::{info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::client::Connection;
use crate::error::{FtpServerError, TransferError};
use crate::transfer::data_channel::Readiness;
use crate::transfer::socket::{Completion, DataSocket};

pub type DataSource = Box<dyn AsyncRead + Send + Unpin>;

/// Something to send to the client over the data connection.
pub enum Payload {
    /// Sent as each line followed by `\r\n`.
    Lines(Vec<String>),
    Bytes(Vec<u8>),
    Reader(DataSource),
}

impl Payload {
    fn into_source(self) -> DataSource {
        match self {
            Payload::Lines(lines) => {
                let mut bytes = Vec::new();
                for line in lines {
                    bytes.extend_from_slice(line.as_bytes());
                    bytes.extend_from_slice(b"\r\n");
                }
                Box::new(Cursor::new(bytes))
            }
            Payload::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            Payload::Reader(reader) => reader,
        }
    }
}

/// Result of an outbound transfer that did not fail fatally.
#[derive(Debug, PartialEq, Eq)]
pub enum Sent {
    Completed(u64),
    /// No usable data connection; the client has already been told.
    Unavailable,
}

/// Result of an inbound transfer.
#[derive(Debug, PartialEq, Eq)]
pub enum Received {
    Completed(u64),
    Failed { received: u64 },
}

/// Streams `payload` to the client. A failure mid-stream is reported with
/// the partial byte count and returned as an error, which ends the control
/// connection.
pub async fn send_outofband_data(
    conn: &mut Connection,
    payload: Payload,
) -> Result<Sent, FtpServerError> {
    let waiter = Arc::clone(&conn.server.waiter);
    let backoff = conn.server.backoff;

    let socket = match conn.data.wait_until_ready(waiter.as_ref(), backoff).await {
        Readiness::Ready(socket) => socket,
        Readiness::Missing => {
            warn!("{}: {}", conn.peer(), TransferError::DataChannelTimeout);
            conn.data.close();
            conn.respond("425 Error establishing connection").await?;
            return Ok(Sent::Unavailable);
        }
        Readiness::HandshakeTimeout(_) => {
            warn!("{}: {}", conn.peer(), TransferError::TlsHandshakeTimeout);
            conn.respond("425 Error while establishing connection. SSL handshake failure?")
                .await?;
            conn.data.close();
            return Ok(Sent::Unavailable);
        }
        Readiness::Aborted(_) => {
            conn.data.close();
            conn.respond("425 Error establishing connection").await?;
            return Ok(Sent::Unavailable);
        }
    };

    conn.respond("150 Data transfer starting").await?;
    conn.data.set_in_use(true);

    let mut source = payload.into_source();
    let mut buf = vec![0u8; conn.server.config.data_channel.chunk_size];
    let mut sent: u64 = 0;
    let outcome = loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(e),
        };
        if let Err(e) = socket.write_chunk(&buf[..n]).await {
            break Err(e);
        }
        sent += n as u64;
    };
    drop(source);
    conn.data.close();

    match outcome {
        Ok(()) => {
            info!("Sent {} bytes to {}", sent, socket.peer());
            conn.respond(&format!("226 Closing data connection, sent {} bytes", sent))
                .await?;
            Ok(Sent::Completed(sent))
        }
        Err(source) => {
            conn.respond(&format!(
                "425 Error while streaming data, sent {} bytes",
                sent
            ))
            .await?;
            Err(TransferError::StreamingFailed { sent, source }.into())
        }
    }
}

/// Waits for the client's data connection ahead of an upload. Replies
/// `425` and returns `None` when it never shows up, so nothing gets opened
/// for writing on that path.
pub async fn wait_for_upload(
    conn: &mut Connection,
) -> Result<Option<Arc<DataSocket>>, FtpServerError> {
    let waiter = Arc::clone(&conn.server.waiter);
    let backoff = conn.server.backoff;

    match conn.data.wait_for_socket(waiter.as_ref(), backoff).await {
        Some(socket) => Ok(Some(socket)),
        None => {
            warn!("{}: {}", conn.peer(), TransferError::DataChannelTimeout);
            conn.data.close();
            conn.respond("425 Error establishing connection").await?;
            Ok(None)
        }
    }
}

/// Forwards everything the client uploads over `socket` into `sink`, which
/// is shut down once the upload completes.
pub async fn receive_outofband_data<W>(
    conn: &mut Connection,
    socket: Arc<DataSocket>,
    sink: &mut W,
) -> Result<Received, FtpServerError>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    conn.respond("150 Data transfer starting").await?;
    conn.data.set_in_use(true);

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    socket.attach_consumer(Box::new(move |chunk| {
        let _ = tx.send(chunk);
    }));

    let mut received: u64 = 0;
    let mut sink_failed = false;
    // the channel closes once the socket stops streaming
    while let Some(chunk) = rx.recv().await {
        if sink_failed {
            continue;
        }
        match sink.write_all(&chunk).await {
            Ok(()) => received += chunk.len() as u64,
            Err(e) => {
                warn!("Failed to store upload from {}: {}", socket.peer(), e);
                sink_failed = true;
                socket.abort();
            }
        }
    }

    let completion = socket.completion().await;
    conn.data.close();

    let leftover = match completion {
        Completion::Received(leftover) if !sink_failed => leftover,
        _ => {
            warn!(
                "{}: {}",
                conn.peer(),
                TransferError::ReceiveFailed { received }
            );
            return Ok(Received::Failed { received });
        }
    };

    if !leftover.is_empty() {
        sink.write_all(&leftover).await.map_err(FtpServerError::IoError)?;
        received += leftover.len() as u64;
    }
    sink.shutdown().await.map_err(FtpServerError::IoError)?;

    info!("Received {} bytes from {}", received, socket.peer());
    Ok(Received::Completed(received))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Harness, TlsFixture};
    use crate::transfer::DataChannelState;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpStream;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn test_lines_payload_reports_exact_byte_count() {
        let mut harness = Harness::new();
        let addr = harness
            .conn
            .data
            .start_passive(LOCALHOST, LOCALHOST, None)
            .await
            .unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();

        let lines = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let sent = send_outofband_data(&mut harness.conn, Payload::Lines(lines))
            .await
            .unwrap();
        assert_eq!(sent, Sent::Completed(17));

        assert_eq!(harness.reply().await, "150 Data transfer starting");
        assert_eq!(
            harness.reply().await,
            "226 Closing data connection, sent 17 bytes"
        );

        let mut data = Vec::new();
        client.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"one\r\ntwo\r\nthree\r\n".to_vec());
    }

    #[tokio::test]
    async fn test_missing_socket_replies_425() {
        let mut harness = Harness::new();
        let sent = send_outofband_data(&mut harness.conn, Payload::Bytes(b"x".to_vec()))
            .await
            .unwrap();
        assert_eq!(sent, Sent::Unavailable);
        assert_eq!(harness.reply().await, "425 Error establishing connection");
    }

    #[tokio::test]
    async fn test_upload_without_socket_replies_425() {
        let mut harness = Harness::new();
        let socket = wait_for_upload(&mut harness.conn).await.unwrap();
        assert!(socket.is_none());
        assert_eq!(harness.reply().await, "425 Error establishing connection");
        assert_eq!(harness.conn.data.state(), DataChannelState::None);
    }

    #[tokio::test]
    async fn test_receive_forwards_upload() {
        let mut harness = Harness::new();
        let addr = harness
            .conn
            .data
            .start_passive(LOCALHOST, LOCALHOST, None)
            .await
            .unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"uploaded bytes").await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let socket = wait_for_upload(&mut harness.conn).await.unwrap().unwrap();
        let mut sink = Vec::new();
        let received = receive_outofband_data(&mut harness.conn, socket, &mut sink)
            .await
            .unwrap();
        assert_eq!(received, Received::Completed(14));
        assert_eq!(sink, b"uploaded bytes".to_vec());
        assert_eq!(harness.reply().await, "150 Data transfer starting");
    }

    #[tokio::test]
    async fn test_stalled_tls_handshake_closes_data_channel() {
        let fixture = TlsFixture::generate();
        let mut harness = Harness::with_security(fixture.security());
        harness.conn.session.tls_handshake_completed();
        harness.conn.session.record_pbsz();
        harness.conn.session.set_secure_data_channel(true);

        let tls = harness.conn.data_tls();
        assert!(tls.is_some());
        let addr = harness
            .conn
            .data
            .start_passive(LOCALHOST, LOCALHOST, tls)
            .await
            .unwrap();
        // plain TCP, never sends a ClientHello
        let _client = TcpStream::connect(addr).await.unwrap();

        let sent = send_outofband_data(&mut harness.conn, Payload::Bytes(b"secret".to_vec()))
            .await
            .unwrap();
        assert_eq!(sent, Sent::Unavailable);
        assert_eq!(
            harness.reply().await,
            "425 Error while establishing connection. SSL handshake failure?"
        );
        assert_eq!(harness.conn.data.state(), DataChannelState::Closed);
    }

    #[tokio::test]
    async fn test_peer_vanishing_mid_stream_is_fatal() {
        let mut harness = Harness::new();
        let addr = harness
            .conn
            .data
            .start_passive(LOCALHOST, LOCALHOST, None)
            .await
            .unwrap();
        let client = TcpStream::connect(addr).await.unwrap();

        let Harness { conn, client: control, .. } = &mut harness;
        let payload = Payload::Bytes(vec![7u8; 32 * 1024 * 1024]);
        let (result, ()) = tokio::join!(send_outofband_data(conn, payload), async {
            let mut line = String::new();
            control.read_line(&mut line).await.unwrap();
            assert_eq!(line, "150 Data transfer starting\r\n");
            drop(client);
        });

        assert!(matches!(
            result,
            Err(FtpServerError::Transfer(TransferError::StreamingFailed { .. }))
        ));
        let reply = harness.reply().await;
        assert!(
            reply.starts_with("425 Error while streaming data, sent "),
            "{}",
            reply
        );
        assert_eq!(harness.conn.data.state(), DataChannelState::Closed);
    }
}
