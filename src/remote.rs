mod filesystem;
mod http;
mod state;
mod traits;

pub use filesystem::FilesystemRemote;
pub use http::HttpRemote;
pub use state::{LinkTarget, PackageState, Revision, StoredEntry};
pub use traits::{CommitRequest, FetchOptions, Remote};
