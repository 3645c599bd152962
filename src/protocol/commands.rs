//! Module `commands`
//!
//! The command vocabulary understood by the server and the parsed form of a
//! request line.

/// FTP command verbs. Unknown verbs are kept as text in [`Request::name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Allo,
    Appe,
    Auth,
    Cdup,
    Cwd,
    Dele,
    Eprt,
    Epsv,
    Feat,
    Help,
    List,
    Mkd,
    Mode,
    Nlst,
    Noop,
    Pass,
    Pasv,
    Pbsz,
    Port,
    Prot,
    Pwd,
    Quit,
    Rest,
    Retr,
    Rmd,
    Rnfr,
    Rnto,
    Size,
    Stor,
    Stou,
    Stru,
    Syst,
    Type,
    User,
    Xcup,
    Xcwd,
    Xpwd,
    Xrmd,
}

impl Verb {
    pub const ALL: [Verb; 38] = [
        Verb::Allo,
        Verb::Appe,
        Verb::Auth,
        Verb::Cdup,
        Verb::Cwd,
        Verb::Dele,
        Verb::Eprt,
        Verb::Epsv,
        Verb::Feat,
        Verb::Help,
        Verb::List,
        Verb::Mkd,
        Verb::Mode,
        Verb::Nlst,
        Verb::Noop,
        Verb::Pass,
        Verb::Pasv,
        Verb::Pbsz,
        Verb::Port,
        Verb::Prot,
        Verb::Pwd,
        Verb::Quit,
        Verb::Rest,
        Verb::Retr,
        Verb::Rmd,
        Verb::Rnfr,
        Verb::Rnto,
        Verb::Size,
        Verb::Stor,
        Verb::Stou,
        Verb::Stru,
        Verb::Syst,
        Verb::Type,
        Verb::User,
        Verb::Xcup,
        Verb::Xcwd,
        Verb::Xpwd,
        Verb::Xrmd,
    ];

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Allo => "allo",
            Verb::Appe => "appe",
            Verb::Auth => "auth",
            Verb::Cdup => "cdup",
            Verb::Cwd => "cwd",
            Verb::Dele => "dele",
            Verb::Eprt => "eprt",
            Verb::Epsv => "epsv",
            Verb::Feat => "feat",
            Verb::Help => "help",
            Verb::List => "list",
            Verb::Mkd => "mkd",
            Verb::Mode => "mode",
            Verb::Nlst => "nlst",
            Verb::Noop => "noop",
            Verb::Pass => "pass",
            Verb::Pasv => "pasv",
            Verb::Pbsz => "pbsz",
            Verb::Port => "port",
            Verb::Prot => "prot",
            Verb::Pwd => "pwd",
            Verb::Quit => "quit",
            Verb::Rest => "rest",
            Verb::Retr => "retr",
            Verb::Rmd => "rmd",
            Verb::Rnfr => "rnfr",
            Verb::Rnto => "rnto",
            Verb::Size => "size",
            Verb::Stor => "stor",
            Verb::Stou => "stou",
            Verb::Stru => "stru",
            Verb::Syst => "syst",
            Verb::Type => "type",
            Verb::User => "user",
            Verb::Xcup => "xcup",
            Verb::Xcwd => "xcwd",
            Verb::Xpwd => "xpwd",
            Verb::Xrmd => "xrmd",
        }
    }

    /// Looks up a lowercase verb name.
    pub fn from_name(name: &str) -> Option<Verb> {
        Verb::ALL.iter().copied().find(|verb| verb.as_str() == name)
    }

    /// RFC 4217 commands, only offered when TLS is available.
    pub fn is_tls_extension(self) -> bool {
        matches!(self, Verb::Auth | Verb::Pbsz | Verb::Prot)
    }

    /// Commands that move file or listing data over the data connection.
    pub fn uses_data_channel(self) -> bool {
        matches!(
            self,
            Verb::Stor | Verb::Retr | Verb::Nlst | Verb::List | Verb::Stou | Verb::Appe
        )
    }
}

/// Verbs the server accepts, in alphabetical order.
pub fn whitelist(tls_supported: bool) -> Vec<Verb> {
    Verb::ALL
        .iter()
        .copied()
        .filter(|verb| tls_supported || !verb.is_tls_extension())
        .collect()
}

/// One parsed control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Lowercase verb as sent by the client.
    pub name: String,
    pub verb: Option<Verb>,
    pub param: Option<String>,
}
