//! Error types
//!
//! Defines domain-specific error types for each module of the FTP server.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Authentication module errors
#[derive(Debug)]
pub enum AuthError {
    InvalidUsername(String),
    InvalidPassword(String),
    UserNotFound(String),
    MalformedInput(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidUsername(u) => write!(f, "Invalid username: {}", u),
            AuthError::InvalidPassword(u) => write!(f, "Invalid password for user: {}", u),
            AuthError::UserNotFound(u) => write!(f, "User not found: {}", u),
            AuthError::MalformedInput(s) => write!(f, "Malformed input: {}", s),
        }
    }
}

impl std::error::Error for AuthError {}

/// Storage (driver) errors
#[derive(Debug)]
pub enum StorageError {
    FileNotFound(String),
    DirectoryNotFound(String),
    PermissionDenied(String),
    NotADirectory(String),
    IoError(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::FileNotFound(p) => write!(f, "File not found: {}", p),
            StorageError::DirectoryNotFound(p) => write!(f, "Directory not found: {}", p),
            StorageError::PermissionDenied(p) => write!(f, "Permission denied: {}", p),
            StorageError::NotADirectory(p) => write!(f, "Not a directory: {}", p),
            StorageError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => StorageError::FileNotFound(error.to_string()),
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(error.to_string()),
            _ => StorageError::IoError(error),
        }
    }
}

/// Data channel and transfer errors
#[derive(Debug)]
pub enum TransferError {
    PortBindingFailed(SocketAddr, io::Error),
    InvalidPortCommand(String),
    UnsupportedAddressFamily(String),
    ConnectFailed(String, io::Error),
    ConnectTimeout(String),
    DataChannelTimeout,
    TlsHandshakeTimeout,
    StreamingFailed { sent: u64, source: io::Error },
    ReceiveFailed { received: u64 },
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::PortBindingFailed(addr, e) => {
                write!(f, "Failed to bind to {}: {}", addr, e)
            }
            TransferError::InvalidPortCommand(msg) => write!(f, "Invalid PORT command: {}", msg),
            TransferError::UnsupportedAddressFamily(af) => {
                write!(f, "Unsupported network protocol: {}", af)
            }
            TransferError::ConnectFailed(target, e) => {
                write!(f, "Failed to connect to {}: {}", target, e)
            }
            TransferError::ConnectTimeout(target) => {
                write!(f, "Timeout connecting to {}", target)
            }
            TransferError::DataChannelTimeout => write!(f, "Data connection was never established"),
            TransferError::TlsHandshakeTimeout => {
                write!(f, "Data connection never completed its TLS handshake")
            }
            TransferError::StreamingFailed { sent, source } => {
                write!(f, "Streaming failed after {} bytes: {}", sent, source)
            }
            TransferError::ReceiveFailed { received } => {
                write!(f, "Data connection aborted after receiving {} bytes", received)
            }
        }
    }
}

impl std::error::Error for TransferError {}

/// Control-channel protocol violations that are answered with a reply and
/// leave the connection open.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    MissingParameter,
    IllegalParameter,
    Unauthenticated,
    ProtocolStateViolation(&'static str),
    UnsupportedOption(String),
    UnknownCommand(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MissingParameter => write!(f, "action aborted, required param missing"),
            ProtocolError::IllegalParameter => write!(f, "action aborted, illegal params"),
            ProtocolError::Unauthenticated => write!(f, "Not logged in"),
            ProtocolError::ProtocolStateViolation(msg) => write!(f, "{}", msg),
            ProtocolError::UnsupportedOption(cmd) => write!(f, "{} is an obsolete command", cmd),
            ProtocolError::UnknownCommand(cmd) => write!(f, "Sorry, I don't understand {}", cmd),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// TLS configuration and handshake errors
#[derive(Debug)]
pub enum TlsError {
    UnreadableFile(String, io::Error),
    Certificate(String),
    PrivateKey(String),
    Config(String),
    Handshake(io::Error),
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsError::UnreadableFile(path, e) => write!(f, "Cannot read {}: {}", path, e),
            TlsError::Certificate(msg) => write!(f, "Certificate error: {}", msg),
            TlsError::PrivateKey(msg) => write!(f, "Private key error: {}", msg),
            TlsError::Config(msg) => write!(f, "TLS config error: {}", msg),
            TlsError::Handshake(e) => write!(f, "TLS handshake failed: {}", e),
        }
    }
}

impl std::error::Error for TlsError {}

/// General FTP server error. Anything that reaches the dispatcher as an
/// `FtpServerError` is fatal for the connection.
#[derive(Debug)]
pub enum FtpServerError {
    Transfer(TransferError),
    Storage(StorageError),
    Tls(TlsError),
    IoError(io::Error),
    HandlerFault(String),
}

impl fmt::Display for FtpServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtpServerError::Transfer(e) => write!(f, "Transfer error: {}", e),
            FtpServerError::Storage(e) => write!(f, "Storage error: {}", e),
            FtpServerError::Tls(e) => write!(f, "TLS error: {}", e),
            FtpServerError::IoError(e) => write!(f, "I/O error: {}", e),
            FtpServerError::HandlerFault(e) => write!(f, "Handler fault: {}", e),
        }
    }
}

impl std::error::Error for FtpServerError {}

impl From<TransferError> for FtpServerError {
    fn from(error: TransferError) -> Self {
        FtpServerError::Transfer(error)
    }
}

impl From<StorageError> for FtpServerError {
    fn from(error: StorageError) -> Self {
        FtpServerError::Storage(error)
    }
}

impl From<TlsError> for FtpServerError {
    fn from(error: TlsError) -> Self {
        FtpServerError::Tls(error)
    }
}

impl From<io::Error> for FtpServerError {
    fn from(error: io::Error) -> Self {
        FtpServerError::IoError(error)
    }
}
