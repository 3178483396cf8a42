//! State transitions of files in a working copy.
//!
//! Each operation validates every requested name before touching anything,
//! so a rejected call leaves the checkout and its `.osc` directory unchanged.

use std::collections::{BTreeMap, BTreeSet};

use tokio::io::AsyncWriteExt;

use super::{
    lock::CheckoutLock,
    reconcile::read_disk_file,
    sidecar::{remove_if_exists, set_mtime, NameList, Sidecar},
    validate_file_name, WorkingCopy,
};
use crate::{
    error::{Error, Result},
    model::{FileState, StatedFile},
};

/// Stage files for addition and deletion in one step.
///
/// Files to add must be untracked (or exist on disk without being known to
/// the working copy yet) and become `ToBeAdded` with their current disk
/// content. Files to delete must be tracked; they become `ToBeDeleted` and
/// are removed from the checkout directory, while their HEAD copy in `.osc`
/// is kept so the deletion can be undone.
pub async fn add_and_delete_files(
    wc: &WorkingCopy,
    files_to_add: &[&str],
    files_to_delete: &[&str],
) -> Result<WorkingCopy> {
    let _lock = CheckoutLock::acquire(wc.path())?;

    let to_add: BTreeSet<&str> = files_to_add.iter().copied().collect();
    let to_delete: BTreeSet<&str> = files_to_delete.iter().copied().collect();

    let overlap: Vec<&str> = to_add.intersection(&to_delete).copied().collect();
    if !overlap.is_empty() {
        return Err(Error::Precondition(format!(
            "Cannot add and remove the same files: {}",
            overlap.join(", ")
        )));
    }

    for name in &to_delete {
        match wc.file(name) {
            Some(file) if file.state.is_tracked() => {}
            _ => {
                return Err(Error::Precondition(format!(
                    "Cannot delete {}: file is not tracked",
                    name
                )))
            }
        }
    }

    for name in &to_add {
        validate_file_name(name)?;
        match wc.file(name) {
            Some(file) if file.state == FileState::Untracked => {}
            Some(_) => {
                return Err(Error::Precondition(format!(
                    "Cannot add {}: file is not untracked",
                    name
                )))
            }
            None => {
                let path = wc.path().join(name);
                let is_file = tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false);
                if !is_file {
                    return Err(Error::not_found(&path));
                }
            }
        }
    }

    let mut files: BTreeMap<String, StatedFile> = wc
        .files_in_workdir()
        .iter()
        .map(|f| (f.name().to_string(), f.clone()))
        .collect();

    for name in &to_add {
        let file = read_disk_file(wc.identity(), &wc.path().join(name), name).await?;
        files.insert(name.to_string(), StatedFile::new(file, FileState::ToBeAdded));
    }
    for name in &to_delete {
        if let Some(file) = files.get_mut(*name) {
            file.state = FileState::ToBeDeleted;
        }
    }

    let new_wc = wc.with_files_in_workdir(files.into_values().collect());

    for name in &to_delete {
        remove_if_exists(&wc.path().join(name)).await?;
    }
    write_name_lists(&new_wc).await?;

    tracing::info!(
        "Staged {} file(s) for addition and {} for deletion in {}",
        to_add.len(),
        to_delete.len(),
        wc.identity()
    );
    Ok(new_wc)
}

/// Revert staged additions; the files stay on disk as untracked files.
pub async fn untrack_files(wc: &WorkingCopy, names: &[&str]) -> Result<WorkingCopy> {
    let _lock = CheckoutLock::acquire(wc.path())?;

    for name in names {
        match wc.file(name) {
            Some(file) if file.state == FileState::ToBeAdded => {}
            _ => {
                return Err(Error::Precondition(format!(
                    "Cannot untrack {}: file is not to be added",
                    name
                )))
            }
        }
    }

    let files = wc
        .files_in_workdir()
        .iter()
        .map(|f| {
            if names.contains(&f.name()) {
                f.with_state(FileState::Untracked)
            } else {
                f.clone()
            }
        })
        .collect();
    let new_wc = wc.with_files_in_workdir(files);

    Sidecar::new(new_wc.path())
        .write_name_list(
            NameList::ToBeAdded,
            &new_wc.names_in_state(FileState::ToBeAdded),
        )
        .await?;

    Ok(new_wc)
}

/// Restore deleted or missing files from their HEAD copy in `.osc`.
///
/// The copy never overwrites an existing file, and gets back the
/// modification time recorded at HEAD.
pub async fn undo_file_deletion(wc: &WorkingCopy, names: &[&str]) -> Result<WorkingCopy> {
    let _lock = CheckoutLock::acquire(wc.path())?;
    let sidecar = Sidecar::new(wc.path());
    let names: BTreeSet<&str> = names.iter().copied().collect();

    let mut restore = Vec::with_capacity(names.len());
    for name in &names {
        match wc.file(name) {
            Some(file) if matches!(file.state, FileState::ToBeDeleted | FileState::Missing) => {}
            _ => {
                return Err(Error::Precondition(format!(
                    "Cannot undelete {}: file is neither deleted nor missing",
                    name
                )))
            }
        }

        let head_file = wc.head_file(name).ok_or_else(|| {
            Error::Integrity(format!("{} is not part of HEAD", name))
        })?;

        if !sidecar.backup_exists(name).await? {
            return Err(Error::not_found(sidecar.backup_path(name)));
        }

        let target = wc.path().join(name);
        if tokio::fs::try_exists(&target)
            .await
            .map_err(|e| Error::io(&target, e))?
        {
            return Err(Error::Precondition(format!(
                "Cannot undelete {}: a file with that name already exists",
                name
            )));
        }

        restore.push((head_file, target));
    }

    for (head_file, target) in &restore {
        let contents = sidecar.read_backup(head_file.name()).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target)
            .await
            .map_err(|e| Error::io(target, e))?;
        file.write_all(&contents)
            .await
            .map_err(|e| Error::io(target, e))?;
        file.flush().await.map_err(|e| Error::io(target, e))?;
        drop(file);

        set_mtime(target, head_file.modified_time())?;
        tracing::debug!("Restored {:?}", target);
    }

    let files = wc
        .files_in_workdir()
        .iter()
        .map(|f| match restore.iter().find(|(head, _)| head.name() == f.name()) {
            Some((head, _)) => StatedFile::new((*head).clone(), FileState::Unmodified),
            None => f.clone(),
        })
        .collect();
    let new_wc = wc.with_files_in_workdir(files);

    sidecar
        .write_name_list(
            NameList::ToBeDeleted,
            &new_wc.names_in_state(FileState::ToBeDeleted),
        )
        .await?;

    Ok(new_wc)
}

/// Persist both staged name lists of `wc`
pub(crate) async fn write_name_lists(wc: &WorkingCopy) -> Result<()> {
    let sidecar = Sidecar::new(wc.path());
    sidecar
        .write_name_list(NameList::ToBeAdded, &wc.names_in_state(FileState::ToBeAdded))
        .await?;
    sidecar
        .write_name_list(
            NameList::ToBeDeleted,
            &wc.names_in_state(FileState::ToBeDeleted),
        )
        .await
}
