use std::{
    collections::{BTreeSet, HashMap, HashSet},
    path::Path,
};

use super::{
    lock::CheckoutLock,
    sidecar::{is_reserved_name, NameList, Sidecar},
    WorkingCopy,
};
use crate::{
    error::{Error, Result},
    hash,
    model::{
        from_system_time, from_unix_seconds, Directory, FileState, PackageFile, PackageIdentity,
        StatedFile,
    },
};

/// Read the checkout at `path` and classify every file in it.
///
/// HEAD is taken from the `_files` cache and the backup copies in `.osc`.
/// Both must agree: an entry without an md5, or a backup whose content does
/// not hash to the cached md5, is an [`Error::Integrity`].
pub async fn read_working_copy(path: impl AsRef<Path>) -> Result<WorkingCopy> {
    let path = path.as_ref();
    let _lock = CheckoutLock::acquire(path)?;
    read_locked(path).await
}

/// [`read_working_copy`] for callers already holding the checkout lock
pub(crate) async fn read_locked(path: &Path) -> Result<WorkingCopy> {
    let sidecar = Sidecar::new(path);

    sidecar.check_version().await?;
    let identity = sidecar.read_identity().await?;
    let meta = sidecar.read_meta().await?;
    let head = sidecar.read_files().await?;
    let files_at_head = load_head_files(&sidecar, &identity, &head).await?;

    let to_be_added: BTreeSet<String> = sidecar
        .read_name_list(NameList::ToBeAdded)
        .await?
        .into_iter()
        .collect();
    let to_be_deleted: BTreeSet<String> = sidecar
        .read_name_list(NameList::ToBeDeleted)
        .await?
        .into_iter()
        .collect();

    let files_in_workdir = classify(
        path,
        &identity,
        &files_at_head,
        &to_be_added,
        &to_be_deleted,
    )
    .await?;

    let wc = WorkingCopy::from_parts(identity, path, head, meta, files_at_head, files_in_workdir);
    tracing::debug!(
        "Read working copy of {} at {:?} ({} files at HEAD, {} in directory)",
        wc.identity(),
        path,
        wc.files_at_head().len(),
        wc.files_in_workdir().len()
    );
    Ok(wc)
}

async fn load_head_files(
    sidecar: &Sidecar,
    identity: &PackageIdentity,
    head: &Directory,
) -> Result<Vec<PackageFile>> {
    let mut files = Vec::with_capacity(head.entries.len());

    for entry in &head.entries {
        let md5 = entry.md5.as_deref().ok_or_else(|| {
            Error::Integrity(format!("Cached entry {} has no md5 hash", entry.name))
        })?;

        let contents = match sidecar.read_backup(&entry.name).await {
            Ok(contents) => contents,
            Err(Error::NotFound { path }) => {
                return Err(Error::Integrity(format!(
                    "HEAD copy of {} is missing at {:?}",
                    entry.name, path
                )))
            }
            Err(e) => return Err(e),
        };

        let mtime = match entry.mtime {
            Some(mtime) => from_unix_seconds(mtime),
            None => modified_time(&sidecar.backup_path(&entry.name)).await?,
        };

        let file = PackageFile::new(identity, entry.name.clone(), contents, mtime);
        if file.md5_hash() != md5 {
            return Err(Error::Integrity(format!(
                "HEAD copy of {} has md5 {} but {} is cached",
                entry.name,
                file.md5_hash(),
                md5
            )));
        }

        files.push(file);
    }

    Ok(files)
}

async fn classify(
    path: &Path,
    identity: &PackageIdentity,
    files_at_head: &[PackageFile],
    to_be_added: &BTreeSet<String>,
    to_be_deleted: &BTreeSet<String>,
) -> Result<Vec<StatedFile>> {
    let head_by_name: HashMap<&str, &PackageFile> =
        files_at_head.iter().map(|f| (f.name(), f)).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut files = Vec::new();

    let mut dir = tokio::fs::read_dir(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    while let Some(entry) = dir.next_entry().await.map_err(|e| Error::io(path, e))? {
        let file_path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| Error::io(&file_path, e))?;
        if !file_type.is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!("Skipping file with non UTF-8 name: {:?}", file_path);
            continue;
        };
        if is_reserved_name(&name) {
            tracing::warn!("Skipping {}: name is reserved for checkout metadata", name);
            continue;
        }

        let stated = match head_by_name.get(name.as_str()) {
            None => {
                let file = read_disk_file(identity, &file_path, &name).await?;
                let state = if to_be_added.contains(&name) {
                    FileState::ToBeAdded
                } else {
                    FileState::Untracked
                };
                StatedFile::new(file, state)
            }
            Some(head_file) if to_be_deleted.contains(&name) => {
                StatedFile::new((*head_file).clone(), FileState::ToBeDeleted)
            }
            Some(head_file) => {
                let md5 = hash::md5_file(&file_path).await?;
                if md5 == head_file.md5_hash() {
                    let mtime = modified_time(&file_path).await?;
                    StatedFile::new(head_file.with_modified_time(mtime), FileState::Unmodified)
                } else {
                    let file = read_disk_file(identity, &file_path, &name).await?;
                    StatedFile::new(file, FileState::Modified)
                }
            }
        };

        tracing::trace!("{}: {}", name, stated.state);
        seen.insert(name);
        files.push(stated);
    }

    for head_file in files_at_head {
        if seen.contains(head_file.name()) {
            continue;
        }
        let state = if to_be_deleted.contains(head_file.name()) {
            FileState::ToBeDeleted
        } else {
            FileState::Missing
        };
        files.push(StatedFile::new(head_file.clone(), state));
    }

    for name in to_be_deleted {
        if !head_by_name.contains_key(name.as_str()) {
            tracing::warn!("Ignoring {} in _to_be_deleted: not part of HEAD", name);
        }
    }
    for name in to_be_added {
        if !head_by_name.contains_key(name.as_str()) && !seen.contains(name) {
            tracing::warn!("Ignoring {} in _to_be_added: file does not exist", name);
        }
    }

    Ok(files)
}

/// Capture a file of the checkout directory as it is on disk right now
pub(crate) async fn read_disk_file(
    identity: &PackageIdentity,
    path: &Path,
    name: &str,
) -> Result<PackageFile> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    let mtime = modified_time(path).await?;
    Ok(PackageFile::new(identity, name, contents, mtime))
}

async fn modified_time(path: &Path) -> Result<chrono::DateTime<chrono::Utc>> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    let modified = metadata.modified().map_err(|e| Error::io(path, e))?;
    Ok(from_system_time(modified))
}
