use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Result;
use async_trait::async_trait;
use obs_checkout::{
    config::{CheckoutOptions, CommitOptions},
    hash,
    model::{CommitEntry, CommitFileList, Directory, FileState, PackageIdentity},
    remote::{CommitRequest, FetchOptions, FilesystemRemote, Remote},
    working_copy::{
        self, add_and_delete_files, checkout_package, read_working_copy, undo_file_deletion,
        untrack_files, CheckoutLock,
    },
    Error, WorkingCopy,
};
use tempfile::TempDir;

const API_URL: &str = "file:///srv/obs";

fn identity(package: &str) -> PackageIdentity {
    PackageIdentity::new(API_URL, "home:tester", package)
}

/// Create `package` on `remote` with a first revision holding `files`
async fn seed(
    remote: &FilesystemRemote,
    package: &PackageIdentity,
    link: Option<(&str, &str)>,
    files: &[(&str, &str)],
) -> Result<Directory> {
    remote.create_package(package, link).await?;
    for (name, contents) in files {
        remote
            .upload_file(package, name, contents.as_bytes())
            .await?;
    }
    let request = CommitRequest {
        file_list: CommitFileList {
            entries: files
                .iter()
                .map(|(name, contents)| CommitEntry {
                    name: name.to_string(),
                    md5: hash::md5_hex(contents.as_bytes()),
                    hash: hash::transfer_hash(contents.as_bytes()),
                })
                .collect(),
        },
        comment: Some("initial".to_string()),
        keep_link: link.is_some(),
    };
    remote.commit_file_list(package, &request).await
}

struct Fixture {
    temp: TempDir,
    remote: FilesystemRemote,
    checkout: PathBuf,
}

impl Fixture {
    /// A checkout of a package holding `foo` and `bar`
    async fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let remote = FilesystemRemote::new(temp.path().join("server"));
        let package = identity("hello");
        seed(
            &remote,
            &package,
            None,
            &[("foo", "foo at head\n"), ("bar", "bar at head\n")],
        )
        .await?;

        let checkout = temp.path().join("hello");
        checkout_package(&remote, &package, &checkout, &CheckoutOptions::default()).await?;

        Ok(Fixture {
            temp,
            remote,
            checkout,
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.checkout.join(name)
    }

    fn sidecar(&self, name: &str) -> PathBuf {
        self.checkout.join(".osc").join(name)
    }

    async fn read(&self) -> Result<WorkingCopy> {
        Ok(read_working_copy(&self.checkout).await?)
    }
}

fn state_of(wc: &WorkingCopy, name: &str) -> Option<FileState> {
    wc.file(name).map(|f| f.state)
}

fn mtime_seconds(path: &Path) -> i64 {
    let metadata = fs::metadata(path).unwrap();
    filetime::FileTime::from_last_modification_time(&metadata).unix_seconds()
}

#[tokio::test]
async fn test_fresh_checkout_is_clean() -> Result<()> {
    let fixture = Fixture::new().await?;
    let wc = fixture.read().await?;

    assert!(wc.is_clean());
    assert_eq!(wc.files_at_head().len(), 2);
    assert_eq!(state_of(&wc, "foo"), Some(FileState::Unmodified));
    assert_eq!(state_of(&wc, "bar"), Some(FileState::Unmodified));
    assert_eq!(fs::read_to_string(fixture.path("foo"))?, "foo at head\n");
    assert_eq!(fs::read_to_string(fixture.sidecar("foo"))?, "foo at head\n");
    assert_eq!(
        fs::read_to_string(fixture.sidecar("_osclib_version"))?.trim(),
        working_copy::OSCLIB_VERSION
    );
    Ok(())
}

#[tokio::test]
async fn test_reconcile_classifies_every_file() -> Result<()> {
    let fixture = Fixture::new().await?;
    fs::write(fixture.path("foo"), "changed locally\n")?;
    fs::write(fixture.path("baz"), "new file\n")?;
    fs::write(fixture.path("stray"), "never added\n")?;
    fs::write(fixture.sidecar("_to_be_added"), "baz\n")?;

    let wc = fixture.read().await?;
    assert_eq!(state_of(&wc, "foo"), Some(FileState::Modified));
    assert_eq!(state_of(&wc, "bar"), Some(FileState::Unmodified));
    assert_eq!(state_of(&wc, "baz"), Some(FileState::ToBeAdded));
    assert_eq!(state_of(&wc, "stray"), Some(FileState::Untracked));
    assert_eq!(
        wc.file("foo").unwrap().file.md5_hash(),
        hash::md5_hex(b"changed locally\n")
    );

    fs::remove_file(fixture.path("bar"))?;
    let wc = fixture.read().await?;
    assert_eq!(state_of(&wc, "bar"), Some(FileState::Missing));
    Ok(())
}

#[tokio::test]
async fn test_corrupt_backup_is_an_integrity_error() -> Result<()> {
    let fixture = Fixture::new().await?;
    fs::write(fixture.sidecar("bar"), "tampered\n")?;

    let err = read_working_copy(&fixture.checkout).await.unwrap_err();
    assert!(matches!(err, Error::Integrity(_)), "{:?}", err);
    Ok(())
}

#[tokio::test]
async fn test_materialize_round_trip() -> Result<()> {
    let fixture = Fixture::new().await?;
    fs::write(fixture.path("foo"), "changed locally\n")?;
    fs::write(fixture.path("baz"), "new file\n")?;
    fs::write(fixture.path("stray"), "never added\n")?;
    let wc = fixture.read().await?;
    let wc = add_and_delete_files(&wc, &["baz"], &["bar"]).await?;

    let copy = fixture.temp.path().join("copy");
    let materialized = working_copy::materialize(&wc, &copy).await?;
    let read_back = read_working_copy(&copy).await?;

    assert_eq!(read_back, materialized);
    assert_eq!(read_back.files_in_workdir(), wc.files_in_workdir());
    assert_eq!(read_back.files_at_head(), wc.files_at_head());
    assert!(!copy.join("bar").exists());
    Ok(())
}

#[tokio::test]
async fn test_empty_add_and_delete_is_a_no_op() -> Result<()> {
    let fixture = Fixture::new().await?;
    let wc = fixture.read().await?;

    let unchanged = add_and_delete_files(&wc, &[], &[]).await?;
    assert_eq!(unchanged, wc);
    assert_eq!(fixture.read().await?, wc);
    assert!(!fixture.sidecar("_to_be_added").exists());
    assert!(!fixture.sidecar("_to_be_deleted").exists());
    Ok(())
}

#[tokio::test]
async fn test_add_and_delete_same_file_is_rejected() -> Result<()> {
    let fixture = Fixture::new().await?;
    let wc = fixture.read().await?;

    let err = add_and_delete_files(&wc, &["foo"], &["foo", "bar"])
        .await
        .unwrap_err();
    match err {
        Error::Precondition(message) => assert!(message.contains("foo"), "{}", message),
        other => panic!("unexpected error {:?}", other),
    }

    assert!(fixture.path("foo").exists());
    assert!(fixture.path("bar").exists());
    assert!(!fixture.sidecar("_to_be_deleted").exists());
    assert_eq!(fixture.read().await?, wc);
    Ok(())
}

#[tokio::test]
async fn test_add_untrack_delete_undelete() -> Result<()> {
    let fixture = Fixture::new().await?;
    fs::write(fixture.path("baz"), "new file\n")?;
    let wc = fixture.read().await?;
    assert_eq!(state_of(&wc, "baz"), Some(FileState::Untracked));

    let wc = add_and_delete_files(&wc, &["baz"], &["bar"]).await?;
    assert_eq!(state_of(&wc, "baz"), Some(FileState::ToBeAdded));
    assert_eq!(state_of(&wc, "bar"), Some(FileState::ToBeDeleted));
    assert!(!fixture.path("bar").exists());
    assert!(fixture.sidecar("bar").exists());
    assert_eq!(fs::read_to_string(fixture.sidecar("_to_be_added"))?, "baz\n");
    assert_eq!(fs::read_to_string(fixture.sidecar("_to_be_deleted"))?, "bar\n");
    assert_eq!(fixture.read().await?, wc);

    let wc = untrack_files(&wc, &["baz"]).await?;
    assert_eq!(state_of(&wc, "baz"), Some(FileState::Untracked));
    assert!(fixture.path("baz").exists());
    assert!(!fixture.sidecar("_to_be_added").exists());
    assert_eq!(fixture.read().await?, wc);

    let head_mtime = wc.head_file("bar").unwrap().modified_time().timestamp();
    let wc = undo_file_deletion(&wc, &["bar"]).await?;
    assert_eq!(state_of(&wc, "bar"), Some(FileState::Unmodified));
    assert_eq!(fs::read_to_string(fixture.path("bar"))?, "bar at head\n");
    assert_eq!(mtime_seconds(&fixture.path("bar")), head_mtime);
    assert!(!fixture.sidecar("_to_be_deleted").exists());
    assert_eq!(fixture.read().await?, wc);
    Ok(())
}

#[tokio::test]
async fn test_untrack_requires_staged_addition() -> Result<()> {
    let fixture = Fixture::new().await?;
    let wc = fixture.read().await?;

    let err = untrack_files(&wc, &["foo"]).await.unwrap_err();
    assert!(err.is_precondition(), "{:?}", err);
    Ok(())
}

#[tokio::test]
async fn test_undelete_restores_missing_file() -> Result<()> {
    let fixture = Fixture::new().await?;
    fs::remove_file(fixture.path("foo"))?;
    let wc = fixture.read().await?;
    assert_eq!(state_of(&wc, "foo"), Some(FileState::Missing));

    let wc = undo_file_deletion(&wc, &["foo"]).await?;
    assert!(wc.is_clean());
    assert_eq!(fs::read_to_string(fixture.path("foo"))?, "foo at head\n");
    Ok(())
}

#[tokio::test]
async fn test_undelete_without_backup_fails() -> Result<()> {
    let fixture = Fixture::new().await?;
    let wc = fixture.read().await?;
    let wc = add_and_delete_files(&wc, &[], &["bar"]).await?;
    fs::remove_file(fixture.sidecar("bar"))?;

    let err = undo_file_deletion(&wc, &["bar"]).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{:?}", err);

    let entries = fs::read_dir(&fixture.checkout)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .count();
    assert_eq!(entries, 1);
    assert!(!fixture.path("bar").exists());
    assert_eq!(fs::read_to_string(fixture.sidecar("_to_be_deleted"))?, "bar\n");
    Ok(())
}

#[tokio::test]
async fn test_commit_updates_head_and_remote() -> Result<()> {
    let fixture = Fixture::new().await?;
    let package = identity("hello");
    fs::write(fixture.path("foo"), "foo, second revision\n")?;
    fs::write(fixture.path("baz"), "new file\n")?;
    let wc = fixture.read().await?;
    let wc = add_and_delete_files(&wc, &["baz"], &["bar"]).await?;

    let committed = working_copy::commit(
        &fixture.remote,
        &wc,
        &CommitOptions {
            message: Some("second".to_string()),
            ..CommitOptions::default()
        },
    )
    .await?;

    assert!(committed.is_clean());
    assert_eq!(committed.head().rev.as_deref(), Some("2"));
    assert_eq!(state_of(&committed, "foo"), Some(FileState::Unmodified));
    assert_eq!(state_of(&committed, "baz"), Some(FileState::Unmodified));
    assert_eq!(state_of(&committed, "bar"), None);
    assert!(!fixture.sidecar("bar").exists());
    assert_eq!(
        fs::read_to_string(fixture.sidecar("foo"))?,
        "foo, second revision\n"
    );
    assert!(!fixture.sidecar("_to_be_added").exists());
    assert!(!fixture.sidecar("_to_be_deleted").exists());
    assert_eq!(fixture.read().await?, committed);

    let state = fixture.remote.read_state(&package.project, &package.package).await?;
    let latest = state.latest().unwrap();
    assert_eq!(latest.comment.as_deref(), Some("second"));
    assert_eq!(
        latest.files.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["baz", "foo"]
    );
    Ok(())
}

/// Passes calls through, recording commit requests and optionally renaming
/// the package in commit replies
struct RecordingRemote {
    inner: FilesystemRemote,
    requests: Mutex<Vec<CommitRequest>>,
    reply_name: Option<String>,
    fail_uploads: bool,
}

impl RecordingRemote {
    fn new(inner: FilesystemRemote) -> Self {
        RecordingRemote {
            inner,
            requests: Mutex::new(Vec::new()),
            reply_name: None,
            fail_uploads: false,
        }
    }
}

#[async_trait]
impl Remote for RecordingRemote {
    async fn fetch_directory(
        &self,
        package: &PackageIdentity,
        options: &FetchOptions,
    ) -> Result<Directory> {
        self.inner.fetch_directory(package, options).await
    }

    async fn fetch_file(
        &self,
        package: &PackageIdentity,
        name: &str,
        options: &FetchOptions,
    ) -> Result<Vec<u8>> {
        self.inner.fetch_file(package, name, options).await
    }

    async fn fetch_meta(&self, package: &PackageIdentity) -> Result<Option<String>> {
        self.inner.fetch_meta(package).await
    }

    async fn upload_file(
        &self,
        package: &PackageIdentity,
        name: &str,
        contents: &[u8],
    ) -> Result<()> {
        if self.fail_uploads {
            anyhow::bail!("Upload of {} rejected: quota exceeded", name);
        }
        self.inner.upload_file(package, name, contents).await
    }

    async fn commit_file_list(
        &self,
        package: &PackageIdentity,
        request: &CommitRequest,
    ) -> Result<Directory> {
        self.requests.lock().unwrap().push(request.clone());
        let mut reply = self.inner.commit_file_list(package, request).await?;
        if let Some(name) = &self.reply_name {
            reply.name = name.clone();
        }
        Ok(reply)
    }
}

#[tokio::test]
async fn test_commit_of_linked_package_keeps_link() -> Result<()> {
    let temp = TempDir::new()?;
    let remote = RecordingRemote::new(FilesystemRemote::new(temp.path().join("server")));
    let base = identity("base");
    let branch = identity("branch");
    seed(&remote.inner, &base, None, &[("spec", "base spec\n"), ("patch", "p1\n")]).await?;
    seed(
        &remote.inner,
        &branch,
        Some((&base.project, &base.package)),
        &[("spec", "branched spec\n")],
    )
    .await?;

    let checkout = temp.path().join("branch");
    let wc = checkout_package(&remote, &branch, &checkout, &CheckoutOptions::default()).await?;
    assert!(wc.link_info().is_some());
    assert_eq!(fs::read_to_string(checkout.join("spec"))?, "branched spec\n");
    assert_eq!(fs::read_to_string(checkout.join("patch"))?, "p1\n");

    fs::write(checkout.join("spec"), "branched spec, take two\n")?;
    let wc = read_working_copy(&checkout).await?;
    let committed = working_copy::commit(&remote, &wc, &CommitOptions::default()).await?;

    let requests = remote.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].keep_link);
    assert!(committed.link_info().is_some());

    let state = remote
        .inner
        .read_state(&branch.project, &branch.package)
        .await?;
    assert!(state.link.is_some());
    Ok(())
}

#[tokio::test]
async fn test_commit_reply_for_other_package_leaves_checkout_intact() -> Result<()> {
    let fixture = Fixture::new().await?;
    fs::write(fixture.path("baz"), "new file\n")?;
    let wc = fixture.read().await?;
    let wc = add_and_delete_files(&wc, &["baz"], &[]).await?;
    let files_before = fs::read(fixture.sidecar("_files"))?;

    let remote = RecordingRemote {
        reply_name: Some("somebody-else".to_string()),
        ..RecordingRemote::new(FilesystemRemote::new(
            fixture.temp.path().join("server"),
        ))
    };
    let err = working_copy::commit(&remote, &wc, &CommitOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Integrity(_)), "{:?}", err);

    assert_eq!(fs::read(fixture.sidecar("_files"))?, files_before);
    assert_eq!(fs::read_to_string(fixture.sidecar("_to_be_added"))?, "baz\n");
    assert!(!fixture.sidecar("baz").exists());
    assert_eq!(fixture.read().await?, wc);
    Ok(())
}

#[tokio::test]
async fn test_locked_checkout_rejects_operations() -> Result<()> {
    let fixture = Fixture::new().await?;
    let wc = fixture.read().await?;

    let lock = CheckoutLock::acquire(&fixture.checkout)?;
    let err = read_working_copy(&fixture.checkout).await.unwrap_err();
    assert!(matches!(err, Error::Locked { .. }), "{:?}", err);
    let err = add_and_delete_files(&wc, &[], &["bar"]).await.unwrap_err();
    assert!(matches!(err, Error::Locked { .. }), "{:?}", err);
    assert!(fixture.path("bar").exists());

    drop(lock);
    fixture.read().await?;
    Ok(())
}

/// Serves a listing whose md5 does not match the file it hands out
struct LyingRemote(FilesystemRemote);

#[async_trait]
impl Remote for LyingRemote {
    async fn fetch_directory(
        &self,
        package: &PackageIdentity,
        options: &FetchOptions,
    ) -> Result<Directory> {
        self.0.fetch_directory(package, options).await
    }

    async fn fetch_file(
        &self,
        _package: &PackageIdentity,
        _name: &str,
        _options: &FetchOptions,
    ) -> Result<Vec<u8>> {
        Ok(b"not what was listed\n".to_vec())
    }

    async fn fetch_meta(&self, package: &PackageIdentity) -> Result<Option<String>> {
        self.0.fetch_meta(package).await
    }

    async fn upload_file(
        &self,
        package: &PackageIdentity,
        name: &str,
        contents: &[u8],
    ) -> Result<()> {
        self.0.upload_file(package, name, contents).await
    }

    async fn commit_file_list(
        &self,
        package: &PackageIdentity,
        request: &CommitRequest,
    ) -> Result<Directory> {
        self.0.commit_file_list(package, request).await
    }
}

#[tokio::test]
async fn test_checkout_verifies_downloads() -> Result<()> {
    let temp = TempDir::new()?;
    let remote = FilesystemRemote::new(temp.path().join("server"));
    let package = identity("hello");
    seed(&remote, &package, None, &[("foo", "foo at head\n")]).await?;

    let checkout = temp.path().join("hello");
    let err = checkout_package(
        &LyingRemote(remote),
        &package,
        &checkout,
        &CheckoutOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Integrity(_)), "{:?}", err);
    assert!(!checkout.join(".osc").exists());
    Ok(())
}

#[tokio::test]
async fn test_checkout_into_existing_checkout_is_rejected() -> Result<()> {
    let fixture = Fixture::new().await?;
    let err = checkout_package(
        &fixture.remote,
        &identity("hello"),
        &fixture.checkout,
        &CheckoutOptions::default(),
    )
    .await
    .unwrap_err();
    assert!(err.is_precondition(), "{:?}", err);
    Ok(())
}

#[tokio::test]
async fn test_checkout_stores_meta() -> Result<()> {
    let temp = TempDir::new()?;
    let remote = FilesystemRemote::new(temp.path().join("server"));
    let package = identity("hello");
    seed(&remote, &package, None, &[("foo", "foo at head\n")]).await?;
    remote
        .write_meta(&package, "<package name=\"hello\"/>\n")
        .await?;

    let checkout = temp.path().join("hello");
    checkout_package(&remote, &package, &checkout, &CheckoutOptions::default()).await?;
    let wc = read_working_copy(&checkout).await?;
    assert_eq!(wc.meta(), Some("<package name=\"hello\"/>\n"));
    assert_eq!(wc.identity(), &package);
    Ok(())
}

#[tokio::test]
async fn test_reserved_names_cannot_be_added() -> Result<()> {
    let fixture = Fixture::new().await?;
    let files_before = fs::read(fixture.sidecar("_files"))?;
    fs::write(fixture.path("_files"), "not a listing\n")?;

    let wc = fixture.read().await?;
    assert!(wc.file("_files").is_none());

    let err = add_and_delete_files(&wc, &["_files"], &[]).await.unwrap_err();
    assert!(matches!(err, Error::Precondition(_)), "{:?}", err);
    assert!(!fixture.sidecar("_to_be_added").exists());
    assert_eq!(fs::read(fixture.sidecar("_files"))?, files_before);

    let committed = working_copy::commit(&fixture.remote, &wc, &CommitOptions::default()).await?;
    assert!(committed.head_file("_files").is_none());
    assert_eq!(fs::read_to_string(fixture.path("_files"))?, "not a listing\n");
    assert_eq!(fixture.read().await?, committed);
    Ok(())
}

#[tokio::test]
async fn test_checkout_refuses_to_overwrite_local_files() -> Result<()> {
    let temp = TempDir::new()?;
    let remote = FilesystemRemote::new(temp.path().join("server"));
    let package = identity("hello");
    seed(&remote, &package, None, &[("foo", "foo at head\n")]).await?;

    let checkout = temp.path().join("hello");
    fs::create_dir(&checkout)?;
    fs::write(checkout.join("foo"), "local work\n")?;
    fs::write(checkout.join("other"), "unrelated\n")?;

    let err = checkout_package(&remote, &package, &checkout, &CheckoutOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::Precondition(message) => assert!(message.contains("foo"), "{}", message),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(fs::read_to_string(checkout.join("foo"))?, "local work\n");
    assert!(!checkout.join(".osc").exists());
    Ok(())
}

#[tokio::test]
async fn test_checkout_into_directory_with_other_files() -> Result<()> {
    let temp = TempDir::new()?;
    let remote = FilesystemRemote::new(temp.path().join("server"));
    let package = identity("hello");
    seed(&remote, &package, None, &[("foo", "foo at head\n")]).await?;

    let checkout = temp.path().join("hello");
    fs::create_dir(&checkout)?;
    fs::write(checkout.join("other"), "unrelated\n")?;

    let wc = checkout_package(&remote, &package, &checkout, &CheckoutOptions::default()).await?;
    assert_eq!(state_of(&wc, "foo"), Some(FileState::Unmodified));
    assert_eq!(state_of(&wc, "other"), Some(FileState::Untracked));
    assert_eq!(fs::read_to_string(checkout.join("other"))?, "unrelated\n");
    assert_eq!(read_working_copy(&checkout).await?, wc);
    Ok(())
}

#[tokio::test]
async fn test_delete_requires_tracked_file() -> Result<()> {
    let fixture = Fixture::new().await?;
    fs::write(fixture.path("baz"), "new file\n")?;
    fs::write(fixture.path("stray"), "never added\n")?;
    let wc = fixture.read().await?;
    let wc = add_and_delete_files(&wc, &["baz"], &[]).await?;

    for name in ["baz", "stray"] {
        let err = add_and_delete_files(&wc, &[], &[name]).await.unwrap_err();
        match err {
            Error::Precondition(message) => assert!(message.contains("not tracked"), "{}", message),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(fixture.path(name).exists());
    }
    assert_eq!(fixture.read().await?, wc);
    Ok(())
}

#[tokio::test]
async fn test_add_requires_untracked_file() -> Result<()> {
    let fixture = Fixture::new().await?;
    fs::write(fixture.path("foo"), "changed locally\n")?;
    let wc = fixture.read().await?;
    assert_eq!(state_of(&wc, "foo"), Some(FileState::Modified));

    let err = add_and_delete_files(&wc, &["foo"], &[]).await.unwrap_err();
    match err {
        Error::Precondition(message) => assert!(message.contains("not untracked"), "{}", message),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!fixture.sidecar("_to_be_added").exists());
    Ok(())
}

#[tokio::test]
async fn test_add_file_created_after_read() -> Result<()> {
    let fixture = Fixture::new().await?;
    let wc = fixture.read().await?;
    fs::write(fixture.path("late"), "written after the read\n")?;
    assert!(wc.file("late").is_none());

    let wc = add_and_delete_files(&wc, &["late"], &[]).await?;
    assert_eq!(state_of(&wc, "late"), Some(FileState::ToBeAdded));
    assert_eq!(
        wc.file("late").unwrap().file.md5_hash(),
        hash::md5_hex(b"written after the read\n")
    );
    assert_eq!(fixture.read().await?, wc);
    Ok(())
}

#[tokio::test]
async fn test_add_of_absent_file_is_not_found() -> Result<()> {
    let fixture = Fixture::new().await?;
    let wc = fixture.read().await?;

    let err = add_and_delete_files(&wc, &["ghost"], &[]).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{:?}", err);
    assert!(!fixture.sidecar("_to_be_added").exists());
    Ok(())
}

#[tokio::test]
async fn test_listed_deletion_still_on_disk_is_to_be_deleted() -> Result<()> {
    let fixture = Fixture::new().await?;
    fs::write(fixture.sidecar("_to_be_deleted"), "bar\n")?;

    let wc = fixture.read().await?;
    assert!(fixture.path("bar").exists());
    assert_eq!(state_of(&wc, "bar"), Some(FileState::ToBeDeleted));
    assert_eq!(
        wc.file("bar").unwrap().file.md5_hash(),
        hash::md5_hex(b"bar at head\n")
    );
    Ok(())
}

#[tokio::test]
async fn test_unmodified_file_keeps_disk_mtime() -> Result<()> {
    let fixture = Fixture::new().await?;
    let before = fixture.read().await?;
    let head_mtime = before.head_file("foo").unwrap().modified_time().timestamp();

    let touched = head_mtime - 3600;
    filetime::set_file_mtime(
        fixture.path("foo"),
        filetime::FileTime::from_unix_time(touched, 0),
    )?;

    let wc = fixture.read().await?;
    let foo = wc.file("foo").unwrap();
    assert_eq!(foo.state, FileState::Unmodified);
    assert_eq!(foo.file.modified_time().timestamp(), touched);
    assert_eq!(
        wc.head_file("foo").unwrap().modified_time().timestamp(),
        head_mtime
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_upload_leaves_checkout_intact() -> Result<()> {
    let fixture = Fixture::new().await?;
    fs::write(fixture.path("foo"), "changed locally\n")?;
    fs::write(fixture.path("baz"), "new file\n")?;
    let wc = fixture.read().await?;
    let wc = add_and_delete_files(&wc, &["baz"], &["bar"]).await?;
    let files_before = fs::read(fixture.sidecar("_files"))?;

    let remote = RecordingRemote {
        fail_uploads: true,
        ..RecordingRemote::new(FilesystemRemote::new(fixture.temp.path().join("server")))
    };
    let err = working_copy::commit(&remote, &wc, &CommitOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Remote(_)), "{:?}", err);
    assert!(remote.requests.lock().unwrap().is_empty());

    assert_eq!(fs::read(fixture.sidecar("_files"))?, files_before);
    assert_eq!(fs::read_to_string(fixture.sidecar("_to_be_added"))?, "baz\n");
    assert_eq!(fs::read_to_string(fixture.sidecar("_to_be_deleted"))?, "bar\n");
    assert!(fixture.sidecar("bar").exists());
    assert_eq!(fixture.read().await?, wc);
    Ok(())
}

#[tokio::test]
async fn test_commit_keeps_missing_file() -> Result<()> {
    let fixture = Fixture::new().await?;
    let package = identity("hello");
    fs::remove_file(fixture.path("foo"))?;
    fs::write(fixture.path("bar"), "bar, second revision\n")?;
    let wc = fixture.read().await?;
    assert_eq!(state_of(&wc, "foo"), Some(FileState::Missing));

    let remote = RecordingRemote::new(FilesystemRemote::new(fixture.temp.path().join("server")));
    let committed = working_copy::commit(&remote, &wc, &CommitOptions::default()).await?;

    let requests = remote.requests.lock().unwrap().clone();
    let names: Vec<&str> = requests[0]
        .file_list
        .entries
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, vec!["bar", "foo"]);

    assert_eq!(state_of(&committed, "foo"), Some(FileState::Missing));
    assert!(committed.head_file("foo").is_some());
    assert!(fixture.sidecar("foo").exists());
    assert_eq!(fixture.read().await?, committed);

    let state = remote
        .inner
        .read_state(&package.project, &package.package)
        .await?;
    assert!(state.latest().unwrap().files.contains_key("foo"));
    Ok(())
}
