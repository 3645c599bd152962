//! Client connections
//!
//! Per-connection state, the control channel and the command loop.

pub mod control;
pub mod handler;
pub mod session;
pub mod state;

pub use handler::handle_client;
pub use session::Connection;
pub use state::{Session, TransferType};
