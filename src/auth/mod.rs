//! Authentication system
//!
//! Credential storage and validation used by the local filesystem driver.

pub mod credentials;
pub mod validator;

pub use credentials::Credentials;
pub use validator::{validate_password, validate_user};
