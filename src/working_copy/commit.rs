use anyhow::Context;
use futures::{StreamExt, TryStreamExt};

use super::{
    lock::CheckoutLock,
    sidecar::{remove_if_exists, NameList, Sidecar},
    WorkingCopy,
};
use crate::{
    config::CommitOptions,
    error::{Error, Result},
    model::{CommitEntry, CommitFileList, FileState, PackageFile, StatedFile},
    progress,
    remote::{CommitRequest, Remote},
};

/// Commit all staged changes of `wc` as a new revision.
///
/// Flow:
/// 1. Upload modified and added files, concurrently
/// 2. Submit the new file list (with `keeplink` for linked packages)
/// 3. Check the reply belongs to this package
/// 4. Update the checkout directory and `.osc` to the new HEAD
///
/// Nothing local is written before step 4, so a failed upload, a rejected
/// commit or a bogus reply leave the checkout as it was.
pub async fn commit<R: Remote + ?Sized>(
    remote: &R,
    wc: &WorkingCopy,
    options: &CommitOptions,
) -> Result<WorkingCopy> {
    let _lock = CheckoutLock::acquire(wc.path())?;
    let identity = wc.identity();

    let changed: Vec<&PackageFile> = wc
        .files_in_workdir()
        .iter()
        .filter(|f| matches!(f.state, FileState::Modified | FileState::ToBeAdded))
        .map(|f| &f.file)
        .collect();

    tracing::info!("Uploading {} file(s) to {}", changed.len(), identity);
    let bar = progress::transfer_bar(changed.len(), "Uploading");
    futures::stream::iter(changed.iter().copied())
        .map(|file| {
            let bar = bar.clone();
            async move {
                remote
                    .upload_file(identity, file.name(), file.contents())
                    .await
                    .with_context(|| format!("Failed to upload {}", file.name()))?;
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
                Ok::<_, anyhow::Error>(())
            }
        })
        .buffer_unordered(options.upload_concurrency.max(1))
        .try_collect::<Vec<()>>()
        .await?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let request = CommitRequest {
        file_list: commit_file_list(wc),
        comment: options.message.clone(),
        keep_link: wc.link_info().is_some(),
    };
    let reply = remote.commit_file_list(identity, &request).await?;

    if reply.name != identity.package {
        return Err(Error::Integrity(format!(
            "Commit to {} was answered with a listing of package {:?}",
            identity, reply.name
        )));
    }

    let files_in_workdir: Vec<StatedFile> = wc
        .files_in_workdir()
        .iter()
        .filter(|f| f.state != FileState::ToBeDeleted)
        .map(|f| match f.state {
            FileState::Modified | FileState::ToBeAdded => f.with_state(FileState::Unmodified),
            _ => f.clone(),
        })
        .collect();
    let files_at_head: Vec<PackageFile> = files_in_workdir
        .iter()
        .filter(|f| matches!(f.state, FileState::Unmodified | FileState::Missing))
        .map(|f| f.file.clone())
        .collect();

    warn_on_listing_mismatch(&reply.entries, &files_at_head);

    let new_wc = WorkingCopy::from_parts(
        identity.clone(),
        wc.path(),
        reply,
        wc.meta().map(str::to_string),
        files_at_head,
        files_in_workdir,
    );

    let sidecar = Sidecar::new(wc.path());
    for deleted in wc.files_in_state(FileState::ToBeDeleted) {
        remove_if_exists(&wc.path().join(deleted.name())).await?;
        sidecar.remove_backup(deleted.name()).await?;
    }
    for file in &changed {
        sidecar.write_backup(file).await?;
    }
    sidecar.write_files(&new_wc.head_listing()).await?;
    sidecar.write_name_list(NameList::ToBeAdded, &[]).await?;
    sidecar.write_name_list(NameList::ToBeDeleted, &[]).await?;

    tracing::info!(
        "Committed {} as revision {} ({})",
        identity,
        new_wc.head().rev.as_deref().unwrap_or("?"),
        new_wc.content_hash().unwrap_or("no source hash")
    );
    Ok(new_wc)
}

/// The file list a commit of `wc` submits: everything except untracked and
/// deleted files, with a SHA-256 of the captured contents next to the md5
pub fn commit_file_list(wc: &WorkingCopy) -> CommitFileList {
    CommitFileList {
        entries: wc
            .files_in_workdir()
            .iter()
            .filter(|f| !matches!(f.state, FileState::Untracked | FileState::ToBeDeleted))
            .map(|f| CommitEntry {
                name: f.name().to_string(),
                md5: f.file.md5_hash().to_string(),
                hash: f.file.transfer_hash(),
            })
            .collect(),
    }
}

fn warn_on_listing_mismatch(entries: &[crate::model::DirectoryEntry], files: &[PackageFile]) {
    for file in files {
        match entries.iter().find(|e| e.name == file.name()) {
            Some(entry) if entry.md5.as_deref() == Some(file.md5_hash()) => {}
            Some(entry) => tracing::warn!(
                "Server lists {} with md5 {:?}, local copy has {}",
                file.name(),
                entry.md5,
                file.md5_hash()
            ),
            None => tracing::warn!("Server listing does not contain {}", file.name()),
        }
    }
}
