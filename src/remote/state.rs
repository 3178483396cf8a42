use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash;

/// Server-side state of one package, stored in its `state.yaml`
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct PackageState {
    /// Package this one links onto, as `(project, package)`
    #[serde(default)]
    pub link: Option<LinkTarget>,

    /// Committed revisions, oldest first; revision `n` is at index `n - 1`
    #[serde(default)]
    pub revisions: Vec<Revision>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub project: String,
    pub package: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Revision {
    pub srcmd5: String,
    #[serde(default)]
    pub comment: Option<String>,
    /// Maps file names to their stored content
    #[serde(default)]
    pub files: BTreeMap<String, StoredEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub md5: String,
    pub size: u64,
    /// Unix timestamp in seconds
    pub mtime: i64,
}

impl PackageState {
    pub fn latest(&self) -> Option<&Revision> {
        self.revisions.last()
    }

    /// Look a revision up by number or by source hash
    pub fn find_revision(&self, revision: &str) -> Option<(u64, &Revision)> {
        if let Ok(number) = revision.parse::<u64>() {
            return number
                .checked_sub(1)
                .and_then(|index| self.revisions.get(index as usize))
                .map(|rev| (number, rev));
        }

        self.revisions
            .iter()
            .enumerate()
            .find(|(_, rev)| rev.srcmd5 == revision)
            .map(|(index, rev)| (index as u64 + 1, rev))
    }
}

/// Hash over a file list: MD5 of `"<md5>  <name>\n"` lines in name order
pub fn list_md5(files: &BTreeMap<String, StoredEntry>) -> String {
    let listing: String = files
        .iter()
        .map(|(name, entry)| format!("{}  {}\n", entry.md5, name))
        .collect();
    hash::md5_hex(listing.as_bytes())
}
