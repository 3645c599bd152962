//! Credential storage
//!
//! Username/password pairs loaded from the `[users]` configuration table.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    users: HashMap<String, String>,
}

impl Credentials {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    pub fn password_for(&self, username: &str) -> Option<&str> {
        self.users.get(username).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl FromIterator<(String, String)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
