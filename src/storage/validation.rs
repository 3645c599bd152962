//! Path validation
//!
//! Maps virtual paths onto the server root without ever leaving it.

use std::path::{Path, PathBuf};

use crate::navigate::normalize;

/// Joins the normalised components of `virtual_path` onto `root`.
pub fn virtual_to_real_path(root: &Path, virtual_path: &str) -> PathBuf {
    let mut real = root.to_path_buf();
    for segment in normalize(virtual_path).split('/').filter(|s| !s.is_empty()) {
        real.push(segment);
    }
    real
}
