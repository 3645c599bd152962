//! Navigate module
//!
//! Resolves client-supplied names against the session's working directory.

mod operations;

pub use operations::{build_path, normalize, split_name};
