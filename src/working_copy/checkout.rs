use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};

use super::{
    lock::CheckoutLock,
    mutate::write_name_lists,
    reconcile::read_locked,
    sidecar::{remove_if_exists, write_file, Sidecar},
    validate_file_name, WorkingCopy,
};
use crate::{
    config::CheckoutOptions,
    error::{Error, Result},
    model::{from_unix_seconds, FileState, PackageFile, PackageIdentity, StatedFile},
    progress,
    remote::{FetchOptions, Remote},
};

/// Check out a package from `remote` into `target`.
///
/// `target` may exist but must not already be a checkout, nor hold a file
/// named like one of the package files. Every downloaded file is verified
/// against the md5 of the listing before anything is written.
pub async fn checkout_package<R: Remote + ?Sized>(
    remote: &R,
    identity: &PackageIdentity,
    target: impl AsRef<Path>,
    options: &CheckoutOptions,
) -> Result<WorkingCopy> {
    let target = target.as_ref();
    let sidecar = Sidecar::new(target);
    if tokio::fs::try_exists(sidecar.path())
        .await
        .map_err(|e| Error::io(sidecar.path(), e))?
    {
        return Err(Error::Precondition(format!(
            "{:?} already contains a checkout",
            target
        )));
    }

    let fetch = FetchOptions {
        expand_links: options.expand_links,
        revision: options.revision.clone(),
    };
    let directory = remote.fetch_directory(identity, &fetch).await?;
    let meta = remote.fetch_meta(identity).await?;

    let mut collisions = Vec::new();
    for entry in &directory.entries {
        validate_file_name(&entry.name).map_err(|_| {
            Error::Integrity(format!(
                "Listing of {} contains unusable file name {:?}",
                identity, entry.name
            ))
        })?;
        let path = target.join(&entry.name);
        if tokio::fs::symlink_metadata(&path).await.is_ok() {
            collisions.push(entry.name.as_str());
        }
    }
    if !collisions.is_empty() {
        return Err(Error::Precondition(format!(
            "{:?} already contains files of {}: {}",
            target,
            identity,
            collisions.join(", ")
        )));
    }

    tracing::info!(
        "Downloading {} file(s) of {}",
        directory.entries.len(),
        identity
    );
    let bar = progress::transfer_bar(directory.entries.len(), "Downloading");
    let downloads: Vec<(usize, Vec<u8>)> =
        futures::stream::iter(directory.entries.iter().enumerate())
        .map(|(index, entry)| {
            let fetch = &fetch;
            let bar = bar.clone();
            async move {
                let contents = remote
                    .fetch_file(identity, &entry.name, fetch)
                    .await
                    .with_context(|| format!("Failed to download {}", entry.name))?;
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
                Ok::<_, anyhow::Error>((index, contents))
            }
        })
        .buffer_unordered(options.download_concurrency.max(1))
        .try_collect()
        .await?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let now = Utc::now();
    let mut files_at_head = Vec::with_capacity(downloads.len());
    for (index, contents) in downloads {
        let entry = &directory.entries[index];
        let mtime = entry.mtime.map(from_unix_seconds).unwrap_or(now);
        let file = PackageFile::new(identity, entry.name.clone(), contents, mtime);

        if let Some(md5) = &entry.md5 {
            if md5 != file.md5_hash() {
                return Err(Error::Integrity(format!(
                    "Downloaded {} has md5 {} but the listing says {}",
                    entry.name,
                    file.md5_hash(),
                    md5
                )));
            }
        }
        files_at_head.push(file);
    }

    tokio::fs::create_dir_all(sidecar.path())
        .await
        .map_err(|e| Error::io(sidecar.path(), e))?;
    let _lock = CheckoutLock::acquire(target)?;

    let files_in_workdir = files_at_head
        .iter()
        .map(|f| StatedFile::new(f.clone(), FileState::Unmodified))
        .collect();
    let fetched = WorkingCopy::from_parts(
        identity.clone(),
        target,
        directory,
        meta,
        files_at_head,
        files_in_workdir,
    );
    write_to_disk(&fetched).await?;

    // Unrelated files already in `target` show up as untracked
    let wc = read_locked(target).await?;

    tracing::info!(
        "Checked out {} revision {} into {:?}",
        identity,
        wc.head().rev.as_deref().unwrap_or("?"),
        target
    );
    Ok(wc)
}

/// Store `wc` in `target`, which becomes a checkout in exactly the state `wc`
/// describes. Returns the working copy located at `target`.
///
/// Reading the result back with [`super::read_working_copy`] yields the
/// same value.
pub async fn materialize(wc: &WorkingCopy, target: impl AsRef<Path>) -> Result<WorkingCopy> {
    let target = target.as_ref();
    let sidecar = Sidecar::new(target);
    tokio::fs::create_dir_all(sidecar.path())
        .await
        .map_err(|e| Error::io(sidecar.path(), e))?;
    let _lock = CheckoutLock::acquire(target)?;

    let relocated = wc.relocated(target);
    write_to_disk(&relocated).await?;
    Ok(relocated)
}

/// Write working files, HEAD copies and bookkeeping of `wc`, data first
async fn write_to_disk(wc: &WorkingCopy) -> Result<()> {
    let sidecar = Sidecar::new(wc.path());

    for file in wc.files_at_head() {
        sidecar.write_backup(file).await?;
    }

    for stated in wc.files_in_workdir() {
        let path = wc.path().join(stated.name());
        match stated.state {
            FileState::Missing | FileState::ToBeDeleted => remove_if_exists(&path).await?,
            _ => {
                write_file(&path, stated.file.contents(), stated.file.modified_time()).await?
            }
        }
    }

    sidecar
        .write_metadata(wc.identity(), wc.meta())
        .await?;
    sidecar.write_files(&wc.head_listing()).await?;
    write_name_lists(wc).await?;

    tracing::debug!(
        "Wrote {} file(s) of {} to {:?} (content hash {})",
        wc.files_in_workdir().len(),
        wc.identity(),
        wc.path(),
        wc.content_hash().unwrap_or("none")
    );
    Ok(())
}
