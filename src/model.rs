mod directory;
mod identity;
mod package_file;

pub use directory::{CommitEntry, CommitFileList, Directory, DirectoryEntry, LinkInfo, ServiceInfo};
pub use identity::PackageIdentity;
pub use package_file::{from_system_time, from_unix_seconds, FileState, PackageFile, StatedFile};
