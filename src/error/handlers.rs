//! Error handlers
//!
//! Maps errors to FTP reply codes and logs connection-fatal faults.

use crate::error::types::{FtpServerError, ProtocolError, StorageError};
use log::error;

/// Log a connection-fatal error
pub fn handle_error(peer: &str, err: &FtpServerError) {
    error!("Fatal error on connection {}: {}", peer, err);
}

/// Convert a protocol error to its FTP reply code
pub fn error_to_ftp_code(err: &ProtocolError) -> u16 {
    match err {
        ProtocolError::MissingParameter => 553,
        ProtocolError::IllegalParameter => 553,
        ProtocolError::Unauthenticated => 530,
        ProtocolError::ProtocolStateViolation(_) => 503,
        ProtocolError::UnsupportedOption(_) => 504,
        ProtocolError::UnknownCommand(_) => 500,
    }
}

/// Convert a storage error to its FTP reply code
pub fn storage_error_to_ftp_code(err: &StorageError) -> u16 {
    match err {
        StorageError::FileNotFound(_) => 550,
        StorageError::DirectoryNotFound(_) => 550,
        StorageError::PermissionDenied(_) => 550,
        StorageError::NotADirectory(_) => 550,
        StorageError::IoError(_) => 550,
    }
}

/// Render a storage error as a reply line without exposing server paths
pub fn storage_error_to_reply(err: &StorageError) -> String {
    let code = storage_error_to_ftp_code(err);
    match err {
        StorageError::PermissionDenied(_) => format!("{} Permission denied", code),
        _ => format!("{} Action not taken", code),
    }
}

/// Render a protocol error as a complete reply line (without CRLF)
pub fn error_to_reply(err: &ProtocolError) -> String {
    format!("{} {}", error_to_ftp_code(err), err)
}
