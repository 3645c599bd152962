//! Navigation operations implementation
//!
//! Virtual paths are always absolute, `/`-separated and never climb above
//! `/`.

/// Resolves `name` against the working directory `prefix`. Without a name,
/// or with a LIST-style option such as `-a`, the working directory itself
/// is returned.
pub fn build_path(prefix: &str, name: Option<&str>) -> String {
    match name {
        Some(name) if name.starts_with('/') => normalize(name),
        Some(name) if !name.is_empty() && !name.starts_with('-') => {
            normalize(&format!("{}/{}", prefix, name))
        }
        _ => normalize(prefix),
    }
}

/// Collapses duplicate slashes, `.` and `..` segments.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Splits a virtual path into its parent directory and final component.
pub fn split_name(path: &str) -> (String, Option<&str>) {
    match path.rsplit_once('/') {
        Some((parent, name)) if !name.is_empty() => (normalize(parent), Some(name)),
        _ => ("/".to_string(), None),
    }
}
