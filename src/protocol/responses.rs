//! FTP response handling
//!
//! Fixed and multi-line replies that do not depend on session state.

use crate::protocol::commands::Verb;

pub const LBRK: &str = "\r\n";

/// Greeting sent when a client connects.
pub fn greeting(server_name: Option<&str>) -> String {
    match server_name {
        Some(name) => format!("220 FTP server (rax-ftps/{}) ready", name),
        None => "220 FTP server (rax-ftps) ready".to_string(),
    }
}

/// Multi-line FEAT reply, terminator included.
pub fn feat_reply(tls_supported: bool) -> String {
    let mut features = vec!["EPRT", "EPSV", "SIZE", "REST STREAM"];
    if tls_supported {
        features.extend(["AUTH TLS", "PBSZ", "PROT"]);
    }

    let mut reply = format!("211- Supported features:{}", LBRK);
    for feature in features {
        reply.push_str(&format!(" {}{}", feature, LBRK));
    }
    reply.push_str(&format!("211 END{}", LBRK));
    reply
}

/// Multi-line HELP reply listing `commands` three per line, terminator
/// included.
pub fn help_reply(commands: &[Verb]) -> String {
    let mut names: Vec<&str> = commands.iter().map(|verb| verb.as_str()).collect();
    names.sort_unstable();

    let mut reply = format!("214- The following commands are recognized.{}", LBRK);
    for slice in names.chunks(3) {
        reply.push_str(&format!("     {}{}", slice.join("\t\t"), LBRK));
    }
    reply.push_str(&format!("214 End of list.{}", LBRK));
    reply
}
