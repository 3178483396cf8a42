//! Client-side working copies of packages on an Open Build Service style
//! source server.
//!
//! A checkout is a plain directory holding the package files plus a `.osc`
//! sidecar directory with the cached HEAD listing, HEAD copies of every file
//! and the lists of staged additions and deletions. The layout is compatible
//! with the canonical command line client.
//!
//! ```no_run
//! # async fn run() -> obs_checkout::Result<()> {
//! use obs_checkout::{config::CommitOptions, remote::FilesystemRemote, working_copy};
//!
//! let remote = FilesystemRemote::new("/srv/obs");
//! let wc = working_copy::read_working_copy("hello").await?;
//! let wc = working_copy::add_and_delete_files(&wc, &["hello.patch"], &[]).await?;
//! let options = CommitOptions {
//!     message: Some("Add patch".to_string()),
//!     ..Default::default()
//! };
//! working_copy::commit(&remote, &wc, &options).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hash;
pub mod model;
mod progress;
pub mod remote;
pub mod working_copy;

pub use error::{Error, Result};
pub use working_copy::WorkingCopy;
