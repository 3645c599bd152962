//! Module `socket`
//!
//! Wraps an established data connection. The wrapper owns a background task
//! that performs the optional TLS handshake, pumps received bytes to
//! whoever consumes them, and resolves a one-shot completion when the peer
//! disconnects or the socket is closed.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Notify, oneshot};
use tokio_rustls::TlsAcceptor;

use crate::tls::MaybeTls;

pub type DataStream = MaybeTls<TcpStream>;

/// Receives inbound chunks once attached.
pub type Consumer = Box<dyn FnMut(Vec<u8>) + Send>;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Which side initiated the data connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSocketKind {
    /// Server dialed out (PORT/EPRT)
    Active,
    /// Client dialed in (PASV/EPSV)
    Passive,
}

/// How a data connection ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    /// Peer closed normally. Carries everything received if no consumer was
    /// ever attached, otherwise empty.
    Received(Vec<u8>),
    /// The socket was aborted or the connection failed.
    Failed,
}

/// Where received bytes go.
enum Inbound {
    Buffering(Vec<u8>),
    Streaming(Consumer),
    Closed,
}

impl Inbound {
    fn receive(&mut self, chunk: &[u8]) {
        match self {
            Inbound::Buffering(buffer) => buffer.extend_from_slice(chunk),
            Inbound::Streaming(consumer) => consumer(chunk.to_vec()),
            Inbound::Closed => {}
        }
    }

    /// Hands buffered bytes to `consumer` once, then streams live.
    fn attach(&mut self, mut consumer: Consumer) {
        match std::mem::replace(self, Inbound::Closed) {
            Inbound::Buffering(buffered) => {
                if !buffered.is_empty() {
                    consumer(buffered);
                }
                *self = Inbound::Streaming(consumer);
            }
            Inbound::Streaming(_) => *self = Inbound::Streaming(consumer),
            // dropping the consumer tells it nothing more will arrive
            Inbound::Closed => {}
        }
    }

    /// Ends the stream, returning any bytes that no consumer ever saw.
    fn finish(&mut self) -> Vec<u8> {
        match std::mem::replace(self, Inbound::Closed) {
            Inbound::Buffering(buffered) => buffered,
            Inbound::Streaming(_) | Inbound::Closed => Vec::new(),
        }
    }
}

pub struct DataSocket {
    kind: DataSocketKind,
    peer: SocketAddr,
    ready: AtomicBool,
    aborted: AtomicBool,
    closing: AtomicBool,
    inbound: Mutex<Inbound>,
    writer: tokio::sync::Mutex<Option<WriteHalf<DataStream>>>,
    completion: Mutex<Option<oneshot::Receiver<Completion>>>,
    shutdown: Notify,
}

impl DataSocket {
    /// Wraps a freshly connected stream. With an acceptor the socket is not
    /// writable until the server-side handshake has completed.
    pub fn establish(
        stream: TcpStream,
        kind: DataSocketKind,
        tls: Option<TlsAcceptor>,
    ) -> Arc<DataSocket> {
        let peer = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        let (done_tx, done_rx) = oneshot::channel();

        let socket = Arc::new(DataSocket {
            kind,
            peer,
            ready: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            inbound: Mutex::new(Inbound::Buffering(Vec::new())),
            writer: tokio::sync::Mutex::new(None),
            completion: Mutex::new(Some(done_rx)),
            shutdown: Notify::new(),
        });

        tokio::spawn(run(Arc::clone(&socket), stream, tls, done_tx));
        socket
    }

    pub fn kind(&self) -> DataSocketKind {
        self.kind
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_ready_for_writing(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Registers the consumer for inbound bytes. Anything received so far is
    /// delivered first, in a single call.
    pub fn attach_consumer(&self, consumer: Consumer) {
        lock(&self.inbound).attach(consumer);
    }

    fn receive(&self, chunk: &[u8]) {
        lock(&self.inbound).receive(chunk);
    }

    /// Writes one chunk, waiting until the peer has drained enough of the
    /// send buffer to accept it.
    pub async fn write_chunk(&self, chunk: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => w.write_all(chunk).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "data connection is not writable",
            )),
        }
    }

    /// Closes the connection once queued writes have been flushed. Only the
    /// first call has any effect.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Closing {:?} data connection to {}", self.kind, self.peer);
        self.shutdown.notify_one();
    }

    /// Marks the socket as failed and closes it after queued writes flush.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.close();
    }

    /// Waits until the connection has ended. Resolves once; later calls
    /// report failure.
    pub async fn completion(&self) -> Completion {
        let receiver = lock(&self.completion).take();
        match receiver {
            Some(rx) => rx.await.unwrap_or(Completion::Failed),
            None => Completion::Failed,
        }
    }
}

/// Lifecycle of one data connection: handshake, read pump, teardown.
async fn run(
    socket: Arc<DataSocket>,
    stream: TcpStream,
    tls: Option<TlsAcceptor>,
    done: oneshot::Sender<Completion>,
) {
    let stream = match tls {
        Some(acceptor) => {
            let handshake = tokio::select! {
                result = acceptor.accept(stream) => Some(result),
                _ = socket.shutdown.notified() => None,
            };
            match handshake {
                Some(Ok(tls_stream)) => MaybeTls::Tls(Box::new(tls_stream)),
                Some(Err(e)) => {
                    warn!("TLS handshake with {} failed: {}", socket.peer, e);
                    socket.aborted.store(true, Ordering::Release);
                    unbind(&socket, done);
                    return;
                }
                None => {
                    unbind(&socket, done);
                    return;
                }
            }
        }
        None => MaybeTls::Plain(stream),
    };

    let (mut reader, writer) = tokio::io::split(stream);
    *socket.writer.lock().await = Some(writer);
    socket.ready.store(true, Ordering::Release);
    info!(
        "{:?} data connection with {} ready",
        socket.kind, socket.peer
    );

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => socket.receive(&buf[..n]),
                Err(e) => {
                    warn!("Read from data connection {} failed: {}", socket.peer, e);
                    socket.aborted.store(true, Ordering::Release);
                    break;
                }
            },
            _ = socket.shutdown.notified() => break,
        }
    }

    // the writer lock is held for the duration of any in-flight write
    let writer = socket.writer.lock().await.take();
    if let Some(mut writer) = writer {
        if let Err(e) = writer.flush().await {
            debug!("Flush to {} failed during close: {}", socket.peer, e);
        }
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown of {} failed: {}", socket.peer, e);
        }
    }

    unbind(&socket, done);
}

fn unbind(socket: &DataSocket, done: oneshot::Sender<Completion>) {
    let leftover = lock(&socket.inbound).finish();
    let outcome = if socket.is_aborted() {
        Completion::Failed
    } else {
        Completion::Received(leftover)
    };
    debug!("Data connection with {} ended: {:?}", socket.peer, outcome);
    let _ = done.send(outcome);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
