//! Module `state`
//!
//! Defines the `Session` struct holding per-connection FTP state:
//! authentication, working directory, transfer type and the RFC 4217
//! security negotiation flags.

/// Representation type requested with TYPE. Files are always sent
/// unmodified; the value is only recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Ascii,
    Binary,
}

/// State of one control connection.
///
/// The security flags only ever move forward in order: the command channel
/// must be secure before PBSZ is recorded, and both must hold before a data
/// channel protection level can be chosen.
#[derive(Debug)]
pub struct Session {
    transfer_type: TransferType,
    name_prefix: String,
    requested_user: Option<String>,
    user: Option<String>,
    command_channel_secure: bool,
    pbsz_seen: bool,
    secure_data_channel: bool,
    aborted: bool,
    rename_from: Option<String>,
    restart_offset: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            transfer_type: TransferType::Binary,
            name_prefix: "/".to_string(),
            requested_user: None,
            user: None,
            command_channel_secure: false,
            pbsz_seen: false,
            secure_data_channel: false,
            aborted: false,
            rename_from: None,
            restart_offset: 0,
        }
    }
}

impl Session {
    // --------------------
    // Authentication
    // --------------------

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn requested_user(&self) -> Option<&str> {
        self.requested_user.as_deref()
    }

    /// Remembers the name from USER until PASS arrives.
    pub fn set_requested_user(&mut self, user: String) {
        self.requested_user = Some(user);
    }

    /// Records a successful authentication for the pending USER.
    pub fn login(&mut self) {
        self.user = self.requested_user.take();
    }

    // --------------------
    // Navigation and transfer parameters
    // --------------------

    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    pub fn set_name_prefix(&mut self, path: String) {
        self.name_prefix = path;
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    pub fn set_transfer_type(&mut self, transfer_type: TransferType) {
        self.transfer_type = transfer_type;
    }

    pub fn set_rename_from(&mut self, path: String) {
        self.rename_from = Some(path);
    }

    pub fn take_rename_from(&mut self) -> Option<String> {
        self.rename_from.take()
    }

    pub fn set_restart_offset(&mut self, offset: u64) {
        self.restart_offset = offset;
    }

    /// Returns the REST offset for the next transfer and clears it.
    pub fn take_restart_offset(&mut self) -> u64 {
        std::mem::take(&mut self.restart_offset)
    }

    // --------------------
    // Security negotiation
    // --------------------

    pub fn is_command_channel_secure(&self) -> bool {
        self.command_channel_secure
    }

    /// Called once the control connection TLS handshake has finished. Any
    /// earlier PBSZ/PROT negotiation is discarded.
    pub fn tls_handshake_completed(&mut self) {
        self.command_channel_secure = true;
        self.pbsz_seen = false;
        self.secure_data_channel = false;
    }

    pub fn pbsz_seen(&self) -> bool {
        self.pbsz_seen
    }

    /// Records PBSZ. Returns false, changing nothing, unless the command
    /// channel is secure.
    pub fn record_pbsz(&mut self) -> bool {
        if !self.command_channel_secure {
            return false;
        }
        self.pbsz_seen = true;
        true
    }

    pub fn client_wants_secure_data_channel(&self) -> bool {
        self.secure_data_channel
    }

    /// Records the PROT level. Returns false, changing nothing, unless the
    /// command channel is secure and PBSZ has been seen.
    pub fn set_secure_data_channel(&mut self, secure: bool) -> bool {
        if !(self.command_channel_secure && self.pbsz_seen) {
            return false;
        }
        self.secure_data_channel = secure;
        true
    }

    // --------------------
    // Lifecycle
    // --------------------

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Marks the connection for teardown after the current reply flushes.
    pub fn abort(&mut self) {
        self.aborted = true;
    }
}
