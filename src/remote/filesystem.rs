use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use super::state::{list_md5, LinkTarget, PackageState, Revision, StoredEntry};
use super::traits::{CommitRequest, FetchOptions, Remote};
use crate::{
    hash,
    model::{Directory, DirectoryEntry, LinkInfo, PackageIdentity},
};

/// Directory-backed source service.
///
/// Layout:
/// - `objects/<md5>`: file contents, content addressed and shared by all packages
/// - `<project>/<package>/state.yaml`: revisions and link target
/// - `<project>/<package>/_meta`: optional package configuration
///
/// Behaves like the real service where the working copy engine can observe
/// it, including dropping a package's link when a commit omits `keeplink`.
pub struct FilesystemRemote {
    base_path: PathBuf,
}

impl FilesystemRemote {
    /// Create a new filesystem remote rooted at `base_path`
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        FilesystemRemote {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the path to the objects directory
    fn objects_dir(&self) -> PathBuf {
        self.base_path.join("objects")
    }

    fn package_dir(&self, project: &str, package: &str) -> PathBuf {
        self.base_path.join(project).join(package)
    }

    /// Get the path to a package's state file
    fn state_path(&self, project: &str, package: &str) -> PathBuf {
        self.package_dir(project, package).join("state.yaml")
    }

    /// Create an empty package, optionally linked onto another one
    pub async fn create_package(
        &self,
        package: &PackageIdentity,
        link: Option<(&str, &str)>,
    ) -> Result<()> {
        tokio::fs::create_dir_all(self.objects_dir()).await?;
        tokio::fs::create_dir_all(self.package_dir(&package.project, &package.package))
            .await
            .with_context(|| format!("Failed to create package {}", package))?;

        let state = PackageState {
            link: link.map(|(project, package)| LinkTarget {
                project: project.to_string(),
                package: package.to_string(),
            }),
            revisions: Vec::new(),
        };
        self.write_state(&package.project, &package.package, &state)
            .await
    }

    /// Store the package configuration returned by `fetch_meta`
    pub async fn write_meta(&self, package: &PackageIdentity, meta: &str) -> Result<()> {
        let path = self
            .package_dir(&package.project, &package.package)
            .join("_meta");
        tokio::fs::write(&path, meta)
            .await
            .with_context(|| format!("Failed to write {:?}", path))
    }

    /// Read a package's state, failing if the package does not exist
    pub async fn read_state(&self, project: &str, package: &str) -> Result<PackageState> {
        let state_path = self.state_path(project, package);
        if !tokio::fs::try_exists(&state_path).await? {
            anyhow::bail!("Package {}/{} does not exist", project, package);
        }

        let content = tokio::fs::read_to_string(&state_path)
            .await
            .with_context(|| format!("Failed to read {:?}", state_path))?;
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {:?}", state_path))
    }

    async fn write_state(&self, project: &str, package: &str, state: &PackageState) -> Result<()> {
        let state_path = self.state_path(project, package);
        let temp_path = self.package_dir(project, package).join(".state.yaml.tmp");

        // 1. Write to temp file
        let yaml = serde_yaml::to_string(state)?;
        tokio::fs::write(&temp_path, yaml).await?;

        // 2. Atomic rename (atomic on POSIX systems)
        tokio::fs::rename(&temp_path, &state_path).await?;

        Ok(())
    }

    async fn write_object(&self, content: &[u8]) -> Result<String> {
        let md5 = hash::md5_hex(content);
        let path = self.objects_dir().join(&md5);

        // Only write if doesn't exist (immutable)
        if !tokio::fs::try_exists(&path).await? {
            tokio::fs::create_dir_all(self.objects_dir()).await?;
            tokio::fs::write(&path, content)
                .await
                .with_context(|| format!("Failed to store object {}", md5))?;
        }

        Ok(md5)
    }

    async fn read_object(&self, md5: &str) -> Result<Vec<u8>> {
        let path = self.objects_dir().join(md5);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Object {} is not stored", md5))
    }

    /// Files of a package as seen by a client, with link expansion applied
    async fn resolve(
        &self,
        package: &PackageIdentity,
        options: &FetchOptions,
    ) -> Result<Directory> {
        let state = self.read_state(&package.project, &package.package).await?;

        let (rev, own) = match &options.revision {
            Some(revision) => {
                let (number, rev) = state.find_revision(revision).with_context(|| {
                    format!("Revision {} of {} does not exist", revision, package)
                })?;
                (number, rev.clone())
            }
            None => (state.revisions.len() as u64, state.latest().cloned().unwrap_or_default()),
        };
        let own_md5 = list_md5(&own.files);

        let Some(target) = &state.link else {
            return Ok(to_directory(&package.package, rev, own_md5, None, &own.files));
        };

        let target_state = self.read_state(&target.project, &target.package).await?;
        let target_files = target_state
            .latest()
            .map(|rev| rev.files.clone())
            .unwrap_or_default();
        let target_md5 = list_md5(&target_files);

        let mut expanded = target_files;
        expanded.extend(own.files.clone());
        let expanded_md5 = list_md5(&expanded);

        let link_info = LinkInfo {
            project: target.project.clone(),
            package: target.package.clone(),
            srcmd5: target_md5.clone(),
            baserev: Some(target_md5),
            xsrcmd5: Some(expanded_md5.clone()),
            lsrcmd5: Some(own_md5.clone()),
        };

        if options.expand_links {
            Ok(to_directory(
                &package.package,
                rev,
                expanded_md5,
                Some(link_info),
                &expanded,
            ))
        } else {
            Ok(to_directory(
                &package.package,
                rev,
                own_md5,
                Some(link_info),
                &own.files,
            ))
        }
    }
}

fn to_directory(
    name: &str,
    rev: u64,
    srcmd5: String,
    link_info: Option<LinkInfo>,
    files: &BTreeMap<String, StoredEntry>,
) -> Directory {
    Directory {
        name: name.to_string(),
        rev: Some(rev.to_string()),
        vrev: Some(rev.to_string()),
        srcmd5: Some(srcmd5),
        link_info,
        service_info: None,
        entries: files
            .iter()
            .map(|(name, entry)| DirectoryEntry {
                name: name.clone(),
                md5: Some(entry.md5.clone()),
                size: Some(entry.size),
                mtime: Some(entry.mtime),
            })
            .collect(),
    }
}

#[async_trait]
impl Remote for FilesystemRemote {
    async fn fetch_directory(
        &self,
        package: &PackageIdentity,
        options: &FetchOptions,
    ) -> Result<Directory> {
        self.resolve(package, options).await
    }

    async fn fetch_file(
        &self,
        package: &PackageIdentity,
        name: &str,
        options: &FetchOptions,
    ) -> Result<Vec<u8>> {
        let directory = self.resolve(package, options).await?;
        let md5 = directory
            .entries
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| entry.md5.clone())
            .with_context(|| format!("File {} not found in {}", name, package))?;

        self.read_object(&md5).await
    }

    async fn fetch_meta(&self, package: &PackageIdentity) -> Result<Option<String>> {
        let path = self
            .package_dir(&package.project, &package.package)
            .join("_meta");
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        Ok(Some(tokio::fs::read_to_string(&path).await?))
    }

    async fn upload_file(
        &self,
        package: &PackageIdentity,
        name: &str,
        contents: &[u8],
    ) -> Result<()> {
        // Make sure the package exists before accepting content for it
        self.read_state(&package.project, &package.package).await?;
        let md5 = self.write_object(contents).await?;
        tracing::debug!("Stored {} of {} as object {}", name, package, md5);
        Ok(())
    }

    async fn commit_file_list(
        &self,
        package: &PackageIdentity,
        request: &CommitRequest,
    ) -> Result<Directory> {
        let mut state = self.read_state(&package.project, &package.package).await?;
        let previous = state.latest().cloned().unwrap_or_default();
        let now = Utc::now().timestamp();

        let mut files = BTreeMap::new();
        for entry in &request.file_list.entries {
            let content = self
                .read_object(&entry.md5)
                .await
                .with_context(|| format!("Commit references missing file {}", entry.name))?;

            if hash::transfer_hash(&content) != entry.hash {
                anyhow::bail!("Hash mismatch for {}: expected {}", entry.name, entry.hash);
            }

            let mtime = match previous.files.get(&entry.name) {
                Some(old) if old.md5 == entry.md5 => old.mtime,
                _ => now,
            };
            files.insert(
                entry.name.clone(),
                StoredEntry {
                    md5: entry.md5.clone(),
                    size: content.len() as u64,
                    mtime,
                },
            );
        }

        if state.link.is_some() && !request.keep_link {
            tracing::warn!("Commit to {} without keeplink, dropping its link", package);
            state.link = None;
        }

        state.revisions.push(Revision {
            srcmd5: list_md5(&files),
            comment: request.comment.clone(),
            files,
        });
        self.write_state(&package.project, &package.package, &state)
            .await?;

        self.resolve(
            package,
            &FetchOptions {
                expand_links: true,
                revision: None,
            },
        )
        .await
    }
}
