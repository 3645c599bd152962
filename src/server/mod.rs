//! Server core functionality
//!
//! The accept loop and the context shared by every connection.

pub mod core;

pub use core::{Server, ServerContext};
