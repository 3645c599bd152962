//! Storage driver contract
//!
//! The protocol engine never touches the filesystem itself; every file and
//! authentication operation goes through a [`Driver`]. Paths handed to a
//! driver are normalised absolute virtual paths.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{AuthError, StorageError};

pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;
pub type FileWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[async_trait]
pub trait Driver: Send + Sync {
    async fn authenticate(&self, user: &str, pass: &str) -> Result<(), AuthError>;

    /// Succeeds when `path` names an existing directory.
    async fn change_dir(&self, path: &str) -> Result<(), StorageError>;

    async fn dir_contents(&self, path: &str) -> Result<Vec<DirectoryItem>, StorageError>;

    /// Size of the file at `path`.
    async fn bytes(&self, path: &str) -> Result<u64, StorageError>;

    /// Opens `path` for reading, positioned at `offset`.
    async fn get_file(&self, path: &str, offset: u64) -> Result<FileReader, StorageError>;

    /// Opens `path` for writing, truncating unless `append` is set.
    async fn put_file(&self, path: &str, append: bool) -> Result<FileWriter, StorageError>;

    async fn delete_file(&self, path: &str) -> Result<(), StorageError>;

    async fn delete_dir(&self, path: &str) -> Result<(), StorageError>;

    async fn make_dir(&self, path: &str) -> Result<(), StorageError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError>;
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryItem {
    pub name: String,
    pub size: u64,
    pub directory: bool,
    pub modified: Option<SystemTime>,
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

impl DirectoryItem {
    /// `ls -l` style line as expected by LIST clients.
    pub fn list_line(&self) -> String {
        let (kind, permissions) = if self.directory {
            ('d', "rwxr-xr-x")
        } else {
            ('-', "rw-r--r--")
        };
        format!(
            "{}{} 1 owner group {:>12} {} {}",
            kind,
            permissions,
            self.size,
            list_timestamp(self.modified),
            self.name
        )
    }
}

fn list_timestamp(modified: Option<SystemTime>) -> String {
    let secs = modified
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());
    let (_, month, day) = civil_from_days((secs / 86_400) as i64);
    let seconds_of_day = secs % 86_400;
    format!(
        "{} {:02} {:02}:{:02}",
        MONTHS[(month - 1) as usize],
        day,
        seconds_of_day / 3600,
        seconds_of_day % 3600 / 60
    )
}

/// Converts days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
