use anyhow::Result;
use async_trait::async_trait;

use crate::model::{CommitFileList, Directory, PackageIdentity};

/// How a listing or file is requested from the remote
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchOptions {
    /// Resolve links and return the expanded sources
    pub expand_links: bool,
    /// Revision number or source hash; latest when unset
    pub revision: Option<String>,
}

/// A new file list to be committed as the next revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub file_list: CommitFileList,
    pub comment: Option<String>,
    /// Must be set for linked packages, otherwise the server drops the link
    pub keep_link: bool,
}

/// Routes of the remote source service used by the working copy engine.
///
/// Implementations report failures through `anyhow`; the engine wraps them
/// unchanged into [`crate::Error::Remote`].
#[async_trait]
pub trait Remote: Send + Sync {
    /// Fetch the file listing of a package
    async fn fetch_directory(
        &self,
        package: &PackageIdentity,
        options: &FetchOptions,
    ) -> Result<Directory>;

    /// Download one file of a package
    async fn fetch_file(
        &self,
        package: &PackageIdentity,
        name: &str,
        options: &FetchOptions,
    ) -> Result<Vec<u8>>;

    /// Fetch the package configuration, `None` if the service has none
    async fn fetch_meta(&self, package: &PackageIdentity) -> Result<Option<String>>;

    /// Store file contents without creating a new revision
    async fn upload_file(&self, package: &PackageIdentity, name: &str, contents: &[u8])
        -> Result<()>;

    /// Replace the package's file list and return the resulting listing
    async fn commit_file_list(
        &self,
        package: &PackageIdentity,
        request: &CommitRequest,
    ) -> Result<Directory>;
}
