//! The `.osc` bookkeeping directory of a checkout.
//!
//! File names and formats match the ones used by the canonical command line
//! client so either tool can operate on the same checkout.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime;

use crate::{
    error::{Error, Result},
    model::{Directory, PackageFile, PackageIdentity},
};

pub const SIDECAR_DIR: &str = ".osc";
pub const OSCLIB_VERSION: &str = "1.0";

const VERSION_FILE: &str = "_osclib_version";
const APIURL_FILE: &str = "_apiurl";
const PROJECT_FILE: &str = "_project";
const PACKAGE_FILE: &str = "_package";
const META_FILE: &str = "_meta";
const FILES_FILE: &str = "_files";
const TO_BE_ADDED_FILE: &str = "_to_be_added";
const TO_BE_DELETED_FILE: &str = "_to_be_deleted";
pub(crate) const LOCK_FILE: &str = "_lock";

const RESERVED: &[&str] = &[
    VERSION_FILE,
    APIURL_FILE,
    PROJECT_FILE,
    PACKAGE_FILE,
    META_FILE,
    FILES_FILE,
    TO_BE_ADDED_FILE,
    TO_BE_DELETED_FILE,
    LOCK_FILE,
];

/// Names that would collide with bookkeeping files if backed up into `.osc`
pub(crate) fn is_reserved_name(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Which staged name list to access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameList {
    ToBeAdded,
    ToBeDeleted,
}

impl NameList {
    fn file_name(self) -> &'static str {
        match self {
            NameList::ToBeAdded => TO_BE_ADDED_FILE,
            NameList::ToBeDeleted => TO_BE_DELETED_FILE,
        }
    }
}

/// Access to the `.osc` directory of one checkout
#[derive(Debug, Clone)]
pub struct Sidecar {
    dir: PathBuf,
}

impl Sidecar {
    pub fn new(checkout: &Path) -> Self {
        Sidecar {
            dir: checkout.join(SIDECAR_DIR),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Path of the HEAD copy of a package file
    pub fn backup_path(&self, name: &str) -> PathBuf {
        self.file(name)
    }

    async fn read_text(&self, name: &str) -> Result<String> {
        let path = self.file(name);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::io(&path, e))
    }

    async fn read_optional_text(&self, name: &str) -> Result<Option<String>> {
        let path = self.file(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    pub async fn check_version(&self) -> Result<()> {
        let version = self.read_text(VERSION_FILE).await?;
        if version.trim() != OSCLIB_VERSION {
            return Err(Error::Integrity(format!(
                "Unsupported checkout format version {:?} in {:?}",
                version.trim(),
                self.dir
            )));
        }
        Ok(())
    }

    pub async fn read_identity(&self) -> Result<PackageIdentity> {
        let api_url = self.read_text(APIURL_FILE).await?;
        let project = self.read_text(PROJECT_FILE).await?;
        let package = self.read_text(PACKAGE_FILE).await?;
        Ok(PackageIdentity::new(
            api_url.trim(),
            project.trim(),
            package.trim(),
        ))
    }

    pub async fn read_meta(&self) -> Result<Option<String>> {
        self.read_optional_text(META_FILE).await
    }

    /// Read the cached HEAD listing
    pub async fn read_files(&self) -> Result<Directory> {
        let xml = self.read_text(FILES_FILE).await?;
        Directory::from_xml(&xml)
    }

    /// Read a staged name list; a missing file is an empty list
    pub async fn read_name_list(&self, list: NameList) -> Result<Vec<String>> {
        Ok(self
            .read_optional_text(list.file_name())
            .await?
            .map(|content| {
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn read_backup(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.backup_path(name);
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::not_found(&path)),
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    pub async fn backup_exists(&self, name: &str) -> Result<bool> {
        let path = self.backup_path(name);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::io(&path, e))
    }

    pub async fn write_backup(&self, file: &PackageFile) -> Result<()> {
        write_file(&self.backup_path(file.name()), file.contents(), file.modified_time()).await
    }

    pub async fn remove_backup(&self, name: &str) -> Result<()> {
        remove_if_exists(&self.backup_path(name)).await
    }

    /// Write version, identity and package configuration
    pub async fn write_metadata(&self, identity: &PackageIdentity, meta: Option<&str>) -> Result<()> {
        self.write_index(VERSION_FILE, format!("{}\n", OSCLIB_VERSION).as_bytes())
            .await?;
        self.write_index(APIURL_FILE, format!("{}\n", identity.api_url).as_bytes())
            .await?;
        self.write_index(PROJECT_FILE, format!("{}\n", identity.project).as_bytes())
            .await?;
        self.write_index(PACKAGE_FILE, format!("{}\n", identity.package).as_bytes())
            .await?;

        match meta {
            Some(meta) => self.write_index(META_FILE, meta.as_bytes()).await,
            None => remove_if_exists(&self.file(META_FILE)).await,
        }
    }

    pub async fn write_files(&self, listing: &Directory) -> Result<()> {
        let xml = listing.to_xml()?;
        self.write_index(FILES_FILE, xml.as_bytes()).await
    }

    /// Rewrite a staged name list, removing the file when there is nothing staged
    pub async fn write_name_list(&self, list: NameList, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return remove_if_exists(&self.file(list.file_name())).await;
        }

        let content: String = names.iter().map(|name| format!("{}\n", name)).collect();
        self.write_index(list.file_name(), content.as_bytes()).await
    }

    /// Atomically replace a bookkeeping file (temp file + rename)
    async fn write_index(&self, name: &str, content: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::io(&self.dir, e))?;

        let path = self.file(name);
        let temp_path = self.file(&format!(".{}.tmp", name));

        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| Error::io(&temp_path, e))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::io(&path, e))
    }
}

/// Write a file and set its modification time
pub(crate) async fn write_file(path: &Path, content: &[u8], mtime: DateTime<Utc>) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| Error::io(path, e))?;
    set_mtime(path, mtime)
}

pub(crate) fn set_mtime(path: &Path, mtime: DateTime<Utc>) -> Result<()> {
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime.timestamp(), 0))
        .map_err(|e| Error::io(path, e))
}

pub(crate) async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}
