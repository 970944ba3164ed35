//! Data model for discovered hosts, their shares and indexed files.
//!
//! A [`Host`] exclusively owns its [`Share`]s and a share exclusively owns its
//! files. Everything else here is either append-only ([`Scan`],
//! [`HostHistory`]) or derived and rebuilt wholesale ([`Keyword`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type HostId = i64;
pub type ShareId = i64;
pub type ScanId = i64;

/// Case-fold a hostname or filename for identity and keyword matching.
///
/// Full Unicode lower-casing; SQLite's `lower()` and `LIKE` only fold ASCII,
/// so folded forms are computed here and stored.
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

// ============================================================================
// Hosts & Shares
// ============================================================================

/// A network endpoint that answered on the share port, resolved to a name
/// and exposed at least one share when first discovered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: HostId,
    /// Dotted address, unique
    pub ip: String,
    /// Case-folded reverse name, unique
    pub hostname: String,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Only populated by `list_hosts_with_shares`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shares: Vec<Share>,
}

/// A named file-tree root exposed by a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub id: ShareId,
    pub host_id: HostId,
    pub name: String,
    /// Non-directory entries found by the latest completed walk
    pub file_count: u64,
    /// Aggregate bytes found by the latest completed walk
    pub size: u64,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Files
// ============================================================================

/// One entry emitted by a share walk, ready to be persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub filename: String,
    /// Directory containing the entry, in share-protocol form (`""` is the root,
    /// `"docs\\"` a first-level directory)
    pub path: String,
    /// For directories: aggregate size of everything below
    pub size: u64,
    pub is_directory: bool,
}

impl FileEntry {
    pub fn file(path: impl Into<String>, filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
            size,
            is_directory: false,
        }
    }

    pub fn directory(path: impl Into<String>, filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
            size,
            is_directory: true,
        }
    }
}

/// A persisted file row joined with its owning share and host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: i64,
    pub share_id: ShareId,
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub is_directory: bool,
    pub share_name: String,
    pub hostname: String,
}

impl FileRecord {
    pub fn entry(&self) -> FileEntry {
        FileEntry {
            filename: self.filename.clone(),
            path: self.path.clone(),
            size: self.size,
            is_directory: self.is_directory,
        }
    }

    /// UNC path of the entry: `\\host\share\path\filename`
    pub fn full_path(&self) -> String {
        format!(
            "\\\\{}\\{}\\{}{}",
            self.hostname, self.share_name, self.path, self.filename
        )
    }
}

// ============================================================================
// Run history & derived data
// ============================================================================

/// Append-only record that a phase ran.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub id: ScanId,
    pub task: String,
    pub start_time: DateTime<Utc>,
    pub runtime_ms: u64,
}

/// Per-host totals recorded once per index sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostHistory {
    pub host_id: HostId,
    pub size: u64,
    pub file_count: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Filename token and how many current files contain it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keyword {
    pub keyword: String,
    pub count: u64,
}
