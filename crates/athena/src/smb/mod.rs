//! Share-protocol access
//!
//! The pipeline only sees [`ShareTransport`] and [`ShareSession`]. The
//! production backend drives the `smbclient` tool ([`smbclient`]); the
//! in-memory backend ([`memory`]) serves fixed trees.
//!
//! Paths are in share-protocol form: `""` is the share root and every
//! directory path ends with a backslash (`"docs\\"`, `"docs\\2024\\"`).

pub mod memory;
pub mod parse;
pub mod smbclient;

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// Share names ending in this are administrative and never indexed
pub const ADMIN_SHARE_SUFFIX: char = '$';

pub fn is_admin_share(name: &str) -> bool {
    name.ends_with(ADMIN_SHARE_SUFFIX)
}

/// Drop administrative shares, keeping the original order.
pub fn filter_admin_shares(names: Vec<String>) -> Vec<String> {
    names.into_iter().filter(|name| !is_admin_share(name)).collect()
}

/// One directory entry as listed by the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: u64,
    pub is_directory: bool,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            is_directory: false,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            is_directory: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    AccessDenied,
    AuthFailure,
    ShareNotFound,
    Timeout,
    /// Anything else, with the raw status or cause
    Other(String),
}

impl ProtocolErrorKind {
    /// Failures that are routine on a real network: locked-down directories,
    /// shares that need credentials, vanished shares, slow hosts.
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Map an `NT_STATUS_*` code to a kind
    pub fn from_status(status: &str) -> Self {
        match status {
            "NT_STATUS_ACCESS_DENIED" => Self::AccessDenied,
            "NT_STATUS_LOGON_FAILURE" | "NT_STATUS_ACCOUNT_DISABLED" | "NT_STATUS_ACCOUNT_LOCKED_OUT" => {
                Self::AuthFailure
            }
            "NT_STATUS_BAD_NETWORK_NAME" | "NT_STATUS_OBJECT_NAME_NOT_FOUND" | "NT_STATUS_OBJECT_PATH_NOT_FOUND" => {
                Self::ShareNotFound
            }
            "NT_STATUS_IO_TIMEOUT" | "NT_STATUS_CONNECTION_TIMEOUT" => Self::Timeout,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessDenied => write!(f, "access denied"),
            Self::AuthFailure => write!(f, "authentication failed"),
            Self::ShareNotFound => write!(f, "share not found"),
            Self::Timeout => write!(f, "timed out"),
            Self::Other(cause) => write!(f, "{cause}"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub message: String,
}

impl ProtocolError {
    pub fn new(kind: ProtocolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProtocolErrorKind::Timeout, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ProtocolErrorKind::Other(message.clone()), message)
    }

    pub fn is_expected(&self) -> bool {
        self.kind.is_expected()
    }
}

/// An open connection to one share.
#[async_trait]
pub trait ShareSession: Send {
    /// List the direct children of `path`, without `.` and `..`
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, ProtocolError>;

    /// Release the connection. Never fails; problems are logged.
    async fn close(&mut self);
}

/// Entry point to the share protocol for a whole network.
#[async_trait]
pub trait ShareTransport: Send + Sync {
    /// Names of the disk shares `addr` exposes, administrative ones included
    async fn list_shares(&self, addr: IpAddr) -> Result<Vec<String>, ProtocolError>;

    async fn connect(&self, addr: IpAddr, share: &str) -> Result<Box<dyn ShareSession>, ProtocolError>;
}
