//! Storage
//!
//! The driver contract the protocol engine talks to, and a driver backed by
//! the local filesystem.

pub mod driver;
pub mod filesystem;
pub mod validation;

pub use driver::{DirectoryItem, Driver, FileReader, FileWriter};
pub use filesystem::LocalDriver;
