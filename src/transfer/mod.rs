//! Transfer module for FTP server
//!
//! Handles data channel management, address codecs for active and passive
//! mode, readiness waits and streaming over the data connection.

pub mod backoff;
pub mod data_channel;
pub mod modes;
pub mod socket;
pub mod streaming;

// Re-export key types and functions
pub use backoff::{Backoff, BlockingWaiter, ReactorWaiter, Waiter, waiter_for};
pub use data_channel::{DataChannel, DataChannelState, Readiness};
pub use modes::{epsv_reply, parse_eprt, parse_port, pasv_reply};
pub use socket::{Completion, DataSocket, DataSocketKind};
pub use streaming::{
    Payload, Received, Sent, receive_outofband_data, send_outofband_data, wait_for_upload,
};
