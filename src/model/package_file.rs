use std::{fmt, sync::Arc, time::SystemTime};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use super::{DirectoryEntry, PackageIdentity};
use crate::hash;

/// A file of a package at one point in time.
///
/// The contents are always present and the size and MD5 are derived from them
/// on construction, so a `PackageFile` can never disagree with itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    name: String,
    project_name: String,
    package_name: String,
    size: u64,
    md5_hash: String,
    modified_time: DateTime<Utc>,
    contents: Arc<[u8]>,
}

impl PackageFile {
    pub fn new(
        identity: &PackageIdentity,
        name: impl Into<String>,
        contents: Vec<u8>,
        modified_time: DateTime<Utc>,
    ) -> Self {
        PackageFile {
            name: name.into(),
            project_name: identity.project.clone(),
            package_name: identity.package.clone(),
            size: contents.len() as u64,
            md5_hash: hash::md5_hex(&contents),
            modified_time: truncate_to_seconds(modified_time),
            contents: contents.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn md5_hash(&self) -> &str {
        &self.md5_hash
    }

    pub fn modified_time(&self) -> DateTime<Utc> {
        self.modified_time
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Same contents, stamped with another modification time
    pub fn with_modified_time(&self, modified_time: DateTime<Utc>) -> Self {
        PackageFile {
            modified_time: truncate_to_seconds(modified_time),
            ..self.clone()
        }
    }

    /// `sha256:` digest sent alongside the MD5 when committing
    pub fn transfer_hash(&self) -> String {
        hash::transfer_hash(&self.contents)
    }

    /// Entry describing this file in a `_files` listing
    pub fn to_entry(&self) -> DirectoryEntry {
        DirectoryEntry {
            name: self.name.clone(),
            md5: Some(self.md5_hash.clone()),
            size: Some(self.size),
            mtime: Some(self.modified_time.timestamp()),
        }
    }
}

/// Lifecycle state of a file inside a working copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Unmodified,
    Modified,
    ToBeAdded,
    ToBeDeleted,
    Untracked,
    Missing,
}

impl FileState {
    /// States whose file is part of the package at HEAD and can be deleted
    pub fn is_tracked(self) -> bool {
        matches!(
            self,
            FileState::Unmodified | FileState::Modified | FileState::Missing
        )
    }

    /// Single-letter status code as printed by `status`
    pub fn code(self) -> char {
        match self {
            FileState::Unmodified => ' ',
            FileState::Modified => 'M',
            FileState::ToBeAdded => 'A',
            FileState::ToBeDeleted => 'D',
            FileState::Untracked => '?',
            FileState::Missing => '!',
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileState::Unmodified => "unmodified",
            FileState::Modified => "modified",
            FileState::ToBeAdded => "to be added",
            FileState::ToBeDeleted => "to be deleted",
            FileState::Untracked => "untracked",
            FileState::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// A package file tagged with its working copy state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatedFile {
    pub file: PackageFile,
    pub state: FileState,
}

impl StatedFile {
    pub fn new(file: PackageFile, state: FileState) -> Self {
        StatedFile { file, state }
    }

    pub fn name(&self) -> &str {
        self.file.name()
    }

    pub fn with_state(&self, state: FileState) -> Self {
        StatedFile {
            file: self.file.clone(),
            state,
        }
    }
}

/// Build a timestamp from unix seconds, falling back to the epoch when out of range
pub fn from_unix_seconds(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .unwrap_or_default()
}

/// Convert a filesystem timestamp, dropping sub-second precision
pub fn from_system_time(time: SystemTime) -> DateTime<Utc> {
    truncate_to_seconds(DateTime::<Utc>::from(time))
}

fn truncate_to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    from_unix_seconds(time.timestamp())
}
