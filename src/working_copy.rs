//! Local checkouts of a package.
//!
//! A [`WorkingCopy`] is an immutable value describing the checkout directory:
//! the files at HEAD and the state of every file in the directory. Operations
//! take a working copy by reference, update the directory and its `.osc`
//! sidecar, and return the new value.
//!
//! Every operation holds an exclusive advisory lock on the checkout while it
//! runs, so only one operation can touch a given directory at a time.

mod checkout;
mod commit;
mod lock;
mod mutate;
mod reconcile;
mod sidecar;

use std::path::{Path, PathBuf};

pub use checkout::{checkout_package, materialize};
pub use commit::{commit, commit_file_list};
pub use lock::CheckoutLock;
pub use mutate::{add_and_delete_files, undo_file_deletion, untrack_files};
pub use reconcile::read_working_copy;
pub use sidecar::{Sidecar, OSCLIB_VERSION, SIDECAR_DIR};

use crate::model::{Directory, FileState, LinkInfo, PackageFile, PackageIdentity, StatedFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    identity: PackageIdentity,
    path: PathBuf,
    /// Header of the HEAD listing; its entries are kept empty, `files_at_head` is authoritative
    head: Directory,
    meta: Option<String>,
    files_at_head: Vec<PackageFile>,
    files_in_workdir: Vec<StatedFile>,
}

impl WorkingCopy {
    pub(crate) fn from_parts(
        identity: PackageIdentity,
        path: &Path,
        head: Directory,
        meta: Option<String>,
        mut files_at_head: Vec<PackageFile>,
        mut files_in_workdir: Vec<StatedFile>,
    ) -> Self {
        files_at_head.sort_by(|a, b| a.name().cmp(b.name()));
        files_in_workdir.sort_by(|a, b| a.name().cmp(b.name()));

        WorkingCopy {
            identity,
            path: path.to_path_buf(),
            head: head.with_entries(Vec::new()),
            meta,
            files_at_head,
            files_in_workdir,
        }
    }

    /// Same HEAD, different working directory state
    pub(crate) fn with_files_in_workdir(&self, files_in_workdir: Vec<StatedFile>) -> Self {
        Self::from_parts(
            self.identity.clone(),
            &self.path,
            self.head.clone(),
            self.meta.clone(),
            self.files_at_head.clone(),
            files_in_workdir,
        )
    }

    /// Same state, stored in another directory
    pub(crate) fn relocated(&self, path: &Path) -> Self {
        WorkingCopy {
            path: path.to_path_buf(),
            ..self.clone()
        }
    }

    pub fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Revision header (name, rev, srcmd5, link and service info) of HEAD
    pub fn head(&self) -> &Directory {
        &self.head
    }

    pub fn link_info(&self) -> Option<&LinkInfo> {
        self.head.link_info.as_ref()
    }

    /// Hash of record of the checked out revision
    pub fn content_hash(&self) -> Option<&str> {
        self.head.content_hash()
    }

    /// Raw package configuration XML, if it was fetched
    pub fn meta(&self) -> Option<&str> {
        self.meta.as_deref()
    }

    pub fn files_at_head(&self) -> &[PackageFile] {
        &self.files_at_head
    }

    pub fn files_in_workdir(&self) -> &[StatedFile] {
        &self.files_in_workdir
    }

    pub fn file(&self, name: &str) -> Option<&StatedFile> {
        self.files_in_workdir.iter().find(|f| f.name() == name)
    }

    pub fn head_file(&self, name: &str) -> Option<&PackageFile> {
        self.files_at_head.iter().find(|f| f.name() == name)
    }

    pub fn files_in_state(&self, state: FileState) -> impl Iterator<Item = &StatedFile> + '_ {
        self.files_in_workdir
            .iter()
            .filter(move |f| f.state == state)
    }

    /// Names in `state`, in name order
    pub fn names_in_state(&self, state: FileState) -> Vec<String> {
        self.files_in_state(state)
            .map(|f| f.name().to_string())
            .collect()
    }

    /// True when a commit would not change anything
    pub fn is_clean(&self) -> bool {
        self.files_in_workdir.iter().all(|f| {
            matches!(
                f.state,
                FileState::Unmodified | FileState::Untracked
            )
        })
    }

    /// The `_files` listing describing HEAD
    pub fn head_listing(&self) -> Directory {
        self.head
            .with_entries(self.files_at_head.iter().map(PackageFile::to_entry).collect())
    }
}

/// Reject names that cannot be stored as a plain file of the checkout
pub(crate) fn validate_file_name(name: &str) -> crate::Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(crate::Error::Precondition(format!(
            "Invalid file name: {:?}",
            name
        )));
    }
    if sidecar::is_reserved_name(name) {
        return Err(crate::Error::Precondition(format!(
            "File name {} is reserved for checkout metadata",
            name
        )));
    }
    Ok(())
}
