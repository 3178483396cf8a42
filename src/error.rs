use std::path::{Path, PathBuf};

/// Errors produced by working copy operations.
///
/// `Precondition`, `NotFound`, `Locked` and `Xml` are raised before anything
/// has been written, locally or remotely. `Integrity` and `Remote` leave the
/// checkout untouched, but during a commit they can come after some uploads
/// already reached the server. An `Io` error may interrupt a local write.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The files are not in the state the operation requires.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Cached data and actual content disagree, or the server broke its contract.
    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Checkout is locked by another operation: {}", path.display())]
    Locked { path: PathBuf },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// Failure reported by the remote service, passed through unchanged
    #[error(transparent)]
    Remote(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn not_found(path: impl AsRef<Path>) -> Self {
        Error::NotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// True for errors that reject an operation before any mutation.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Precondition(_) | Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
