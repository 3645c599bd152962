//! FTP command parsing
//!
//! Splits a control line into verb and parameter.

use crate::protocol::commands::{Request, Verb};

/// Parses a control line. The verb is the lowercased text before the first
/// space; the parameter is the trimmed remainder, absent when empty.
pub fn parse_request(line: &str) -> Request {
    let line = line.trim();
    let (name, param) = match line.split_once(' ') {
        Some((name, rest)) => {
            let rest = rest.trim();
            (name, (!rest.is_empty()).then(|| rest.to_string()))
        }
        None => (line, None),
    };

    let name = name.to_ascii_lowercase();
    Request {
        verb: Verb::from_name(&name),
        name,
        param,
    }
}
