//! Error handling
//!
//! Defines error types and handling for the FTP server.

pub mod handlers;
pub mod types;

pub use handlers::{error_to_reply, handle_error, storage_error_to_reply};
pub use types::*;
