use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use fs2::FileExt;

use super::sidecar::{LOCK_FILE, SIDECAR_DIR};
use crate::error::{Error, Result};

/// Exclusive advisory lock on a checkout directory.
///
/// Taken on `.osc/_lock` and released when dropped. Acquisition never blocks:
/// a checkout already locked by another operation fails with
/// [`Error::Locked`].
#[derive(Debug)]
pub struct CheckoutLock {
    file: File,
    path: PathBuf,
}

impl CheckoutLock {
    /// Lock the checkout at `checkout`, whose `.osc` directory must exist
    pub fn acquire(checkout: &Path) -> Result<Self> {
        let sidecar = checkout.join(SIDECAR_DIR);
        if !sidecar.is_dir() {
            return Err(Error::not_found(&sidecar));
        }

        let path = sidecar.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;

        FileExt::try_lock_exclusive(&file).map_err(|_| Error::Locked { path: path.clone() })?;
        tracing::trace!("Locked {:?}", path);

        Ok(CheckoutLock { file, path })
    }
}

impl Drop for CheckoutLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to unlock {:?}: {}", self.path, e);
        }
    }
}
