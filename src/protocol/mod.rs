//! FTP Protocol implementation
//!
//! Handles FTP command parsing, dispatch, the base command handlers and
//! fixed reply texts.

pub mod commands;
pub mod dispatcher;
pub mod handlers;
pub mod parser;
pub mod responses;

pub use commands::{Request, Verb, whitelist};
pub use dispatcher::Dispatcher;
pub use handlers::BaseCommands;
pub use parser::parse_request;
