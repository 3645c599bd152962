//! Module `data_channel`
//!
//! Owns the single data connection of one control connection. Passive mode
//! runs a listener task that accepts exactly one connection from the control
//! peer's address; active mode dials out. Either way the resulting
//! [`DataSocket`] lands in a slot that transfers poll with backoff.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::error::TransferError;
use crate::transfer::backoff::{Backoff, Waiter};
use crate::transfer::socket::{DataSocket, DataSocketKind};

/// Lifecycle of the current data channel attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    None,
    Establishing,
    Ready,
    InUse,
    Closed,
    Failed,
}

/// Outcome of waiting for a writable data connection.
pub enum Readiness {
    Ready(Arc<DataSocket>),
    /// No connection ever showed up.
    Missing,
    /// Connected, but the TLS handshake never finished.
    HandshakeTimeout(Arc<DataSocket>),
    /// Connected, then aborted or closed while waiting.
    Aborted(Arc<DataSocket>),
}

/// Installed socket plus a generation that invalidates stale listeners.
#[derive(Default)]
struct Slot {
    generation: u64,
    socket: Option<Arc<DataSocket>>,
}

type SharedSlot = Arc<Mutex<Slot>>;

#[derive(Default)]
pub struct DataChannel {
    slot: SharedSlot,
    listener: Option<JoinHandle<()>>,
    opened: bool,
    failed: bool,
    in_use: bool,
}

impl DataChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts listening on `host` with an OS-assigned port. Only a
    /// connection from `owner` is accepted.
    pub async fn start_passive(
        &mut self,
        host: IpAddr,
        owner: IpAddr,
        tls: Option<TlsAcceptor>,
    ) -> Result<SocketAddr, TransferError> {
        self.close();

        let bind_addr = SocketAddr::new(host, 0);
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            self.failed = true;
            TransferError::PortBindingFailed(bind_addr, e)
        })?;
        let local = listener.local_addr().map_err(|e| {
            self.failed = true;
            TransferError::PortBindingFailed(bind_addr, e)
        })?;

        let generation = lock(&self.slot).generation;
        self.listener = Some(tokio::spawn(accept_one(
            listener,
            owner,
            tls,
            Arc::clone(&self.slot),
            generation,
        )));
        self.opened = true;

        info!("Listening for passive data connection on {}", local);
        Ok(local)
    }

    /// Dials the client's advertised address.
    pub async fn open_active(
        &mut self,
        target: SocketAddr,
        tls: Option<TlsAcceptor>,
        timeout: Duration,
    ) -> Result<(), TransferError> {
        self.close();
        self.opened = true;

        info!("Connecting to client data port {}", target);
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.failed = true;
                return Err(TransferError::ConnectFailed(target.to_string(), e));
            }
            Err(_) => {
                self.failed = true;
                return Err(TransferError::ConnectTimeout(target.to_string()));
            }
        };

        let socket = DataSocket::establish(stream, DataSocketKind::Active, tls);
        lock(&self.slot).socket = Some(socket);
        info!("Opened active connection at {}", target);
        Ok(())
    }

    /// Closes the current data connection after pending writes flush and
    /// stops any listener still waiting. Safe to call repeatedly.
    pub fn close(&mut self) {
        let socket = {
            let mut slot = lock(&self.slot);
            slot.generation += 1;
            slot.socket.take()
        };
        if let Some(socket) = socket {
            socket.close();
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.in_use = false;
    }

    pub fn current(&self) -> Option<Arc<DataSocket>> {
        lock(&self.slot).socket.clone()
    }

    pub fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use;
    }

    pub fn state(&self) -> DataChannelState {
        if let Some(socket) = self.current() {
            return if self.in_use {
                DataChannelState::InUse
            } else if socket.is_ready_for_writing() {
                DataChannelState::Ready
            } else {
                DataChannelState::Establishing
            };
        }

        match &self.listener {
            Some(listener) if !listener.is_finished() => DataChannelState::Establishing,
            Some(_) => DataChannelState::Failed,
            None if self.failed => DataChannelState::Failed,
            None if self.opened => DataChannelState::Closed,
            None => DataChannelState::None,
        }
    }

    /// Polls for the data connection to exist, giving up when the backoff
    /// is exhausted.
    pub async fn wait_for_socket(
        &self,
        waiter: &dyn Waiter,
        backoff: Backoff,
    ) -> Option<Arc<DataSocket>> {
        let slot = Arc::clone(&self.slot);
        backoff.retry(waiter, || lock(&slot).socket.clone()).await
    }

    /// Waits for the data connection to exist and then for it to become
    /// writable. Each phase has its own backoff.
    pub async fn wait_until_ready(&self, waiter: &dyn Waiter, backoff: Backoff) -> Readiness {
        let Some(socket) = self.wait_for_socket(waiter, backoff).await else {
            return Readiness::Missing;
        };

        let ready = backoff
            .retry(waiter, || {
                if socket.is_aborted() || socket.is_closing() {
                    Some(false)
                } else if socket.is_ready_for_writing() {
                    Some(true)
                } else {
                    None
                }
            })
            .await;

        match ready {
            Some(true) => Readiness::Ready(socket),
            Some(false) => Readiness::Aborted(socket),
            None => Readiness::HandshakeTimeout(socket),
        }
    }
}

impl Drop for DataChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn accept_one(
    listener: TcpListener,
    owner: IpAddr,
    tls: Option<TlsAcceptor>,
    slot: SharedSlot,
    generation: u64,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) if peer.ip().to_canonical() == owner.to_canonical() => {
                let socket = DataSocket::establish(stream, DataSocketKind::Passive, tls);
                let mut slot = lock(&slot);
                if slot.generation == generation {
                    info!("Passive data connection accepted from {}", peer);
                    slot.socket = Some(socket);
                } else {
                    socket.close();
                }
                return;
            }
            Ok((_, peer)) => {
                warn!(
                    "Rejected data connection from {}: control connection is from {}",
                    peer, owner
                );
            }
            Err(e) => {
                error!("Failed to accept passive data connection: {}", e);
                return;
            }
        }
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::backoff::ReactorWaiter;
    use std::net::Ipv4Addr;
    use tokio::io::AsyncReadExt;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn quick_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(5), Duration::from_millis(400))
    }

    #[tokio::test]
    async fn test_passive_accepts_client_connection() {
        let mut channel = DataChannel::new();
        let addr = channel.start_passive(LOCALHOST, LOCALHOST, None).await.unwrap();
        assert_eq!(channel.state(), DataChannelState::Establishing);

        let _client = TcpStream::connect(addr).await.unwrap();
        match channel.wait_until_ready(&ReactorWaiter, quick_backoff()).await {
            Readiness::Ready(socket) => assert_eq!(socket.kind(), DataSocketKind::Passive),
            _ => panic!("passive connection never became ready"),
        }
        assert_eq!(channel.state(), DataChannelState::Ready);
    }

    #[tokio::test]
    async fn test_active_connects_to_client() {
        let client = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = client.local_addr().unwrap();

        let mut channel = DataChannel::new();
        channel
            .open_active(target, None, Duration::from_secs(5))
            .await
            .unwrap();
        let (_stream, _) = client.accept().await.unwrap();

        let socket = channel.current().unwrap();
        assert_eq!(socket.kind(), DataSocketKind::Active);
    }

    #[tokio::test]
    async fn test_active_connect_failure() {
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = unused.local_addr().unwrap();
        drop(unused);

        let mut channel = DataChannel::new();
        let result = channel.open_active(target, None, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(TransferError::ConnectFailed(_, _))));
        assert_eq!(channel.state(), DataChannelState::Failed);
    }

    #[tokio::test]
    async fn test_missing_socket_exhausts_backoff() {
        let channel = DataChannel::new();
        let readiness = channel.wait_until_ready(&ReactorWaiter, quick_backoff()).await;
        assert!(matches!(readiness, Readiness::Missing));
    }

    #[tokio::test]
    async fn test_close_twice_is_noop() {
        let mut channel = DataChannel::new();
        let addr = channel.start_passive(LOCALHOST, LOCALHOST, None).await.unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        let socket = channel
            .wait_for_socket(&ReactorWaiter, quick_backoff())
            .await
            .unwrap();

        channel.close();
        channel.close();
        socket.close();

        assert!(channel.current().is_none());
        assert_eq!(channel.state(), DataChannelState::Closed);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_new_passive_supersedes_previous() {
        let mut channel = DataChannel::new();
        let first = channel.start_passive(LOCALHOST, LOCALHOST, None).await.unwrap();
        let second = channel.start_passive(LOCALHOST, LOCALHOST, None).await.unwrap();
        assert_ne!(first, second);

        let _client = TcpStream::connect(second).await.unwrap();
        assert!(
            channel
                .wait_for_socket(&ReactorWaiter, quick_backoff())
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_foreign_peer_is_rejected() {
        let mut channel = DataChannel::new();
        let foreign_owner = IpAddr::V4(Ipv4Addr::new(10, 9, 8, 7));
        let addr = channel
            .start_passive(LOCALHOST, foreign_owner, None)
            .await
            .unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        assert!(
            channel
                .wait_for_socket(&ReactorWaiter, quick_backoff())
                .await
                .is_none()
        );
    }
}
