use std::fs::{File, OpenOptions};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use crate::error::VerifyError;

const O_NOFOLLOW: i32 = libc::O_NOFOLLOW;

/// A path snapshot captured at approval time, re-verified atomically at
/// open time to close the TOCTOU window between "the user approved this
/// write" and "the write actually happens" (spec.md §3, §4.1).
#[derive(Debug, Clone)]
pub struct ApprovedPath {
    /// The path as the user/tool originally specified it.
    pub user_path: PathBuf,
    /// The canonicalized path at approval time.
    pub resolved_path: PathBuf,
    /// Device of the target file, if it existed at approval time.
    pub device: u64,
    /// Inode of the target file, if it existed at approval time.
    pub inode: u64,
    /// Device of the parent directory at approval time.
    pub parent_device: u64,
    /// Inode of the parent directory at approval time.
    pub parent_inode: u64,
    /// Whether the target existed at approval time.
    pub existed: bool,
    /// The resolved parent directory path.
    pub resolved_parent_path: PathBuf,
}

impl ApprovedPath {
    /// Captures a snapshot of `path` right now, to be re-verified later
    /// by `verify_and_open`. Returns `None` if the parent directory
    /// cannot be stat'd at all (a genuinely unusable path).
    pub fn capture(path: &Path) -> Option<Self> {
        let resolved_path = path.to_path_buf();
        let parent = resolved_path.parent().unwrap_or_else(|| Path::new("."));
        let parent_meta = std::fs::symlink_metadata(parent).ok()?;

        let (device, inode, existed) = match std::fs::symlink_metadata(&resolved_path) {
            Ok(meta) => (meta.dev(), meta.ino(), true),
            Err(_) => (0, 0, false),
        };

        Some(Self {
            user_path: path.to_path_buf(),
            resolved_path,
            device,
            inode,
            parent_device: parent_meta.dev(),
            parent_inode: parent_meta.ino(),
            existed,
            resolved_parent_path: parent.to_path_buf(),
        })
    }
}

/// Atomically re-checks and opens an approved path. For an existing file,
/// opens with `O_NOFOLLOW`, fstat's the result, and fails with
/// `InodeMismatch` unless `(device, inode)` equals the approved tuple.
/// For a new file, opens the parent directory with `O_NOFOLLOW`, verifies
/// the parent `(device, inode)`, then creates the file exclusively
/// (spec.md §4.1).
pub fn verify_and_open(approved: &ApprovedPath, write: bool) -> Result<File, VerifyError> {
    if approved.existed {
        verify_and_open_existing(approved)
    } else {
        verify_and_create_new(approved, write)
    }
}

fn verify_and_open_existing(approved: &ApprovedPath) -> Result<File, VerifyError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(O_NOFOLLOW)
        .open(&approved.resolved_path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VerifyError::Deleted
            } else if is_symlink_errno(&e) {
                VerifyError::Symlink
            } else {
                VerifyError::Open(e.to_string())
            }
        })?;

    let meta = file.metadata().map_err(|e| VerifyError::Stat(e.to_string()))?;
    if meta.dev() != approved.device || meta.ino() != approved.inode {
        return Err(VerifyError::InodeMismatch);
    }
    Ok(file)
}

fn verify_and_create_new(approved: &ApprovedPath, write: bool) -> Result<File, VerifyError> {
    let parent_file = OpenOptions::new()
        .read(true)
        .custom_flags(O_NOFOLLOW)
        .open(&approved.resolved_parent_path)
        .map_err(|e| VerifyError::Open(e.to_string()))?;
    let parent_meta = parent_file
        .metadata()
        .map_err(|e| VerifyError::Stat(e.to_string()))?;
    if parent_meta.dev() != approved.parent_device || parent_meta.ino() != approved.parent_inode {
        return Err(VerifyError::ParentChanged);
    }

    let mut opts = OpenOptions::new();
    opts.read(true).create_new(true).custom_flags(O_NOFOLLOW);
    if write {
        opts.write(true);
    }
    opts.open(&approved.resolved_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            VerifyError::AlreadyExists
        } else {
            VerifyError::Create(e.to_string())
        }
    })
}

fn is_symlink_errno(e: &std::io::Error) -> bool {
    // ELOOP is what O_NOFOLLOW produces when the final component is a
    // symlink on Linux.
    e.raw_os_error() == Some(libc::ELOOP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::symlink;

    #[test]
    fn opens_unmodified_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();
        let approved = ApprovedPath::capture(&path).unwrap();
        assert!(verify_and_open(&approved, true).is_ok());
    }

    #[test]
    fn rejects_inode_swap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();
        let approved = ApprovedPath::capture(&path).unwrap();

        fs::remove_file(&path).unwrap();
        fs::write(&path, b"different inode now").unwrap();

        let err = verify_and_open(&approved, true).unwrap_err();
        assert_eq!(err, VerifyError::InodeMismatch);
    }

    #[test]
    fn rejects_symlink_swap() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.txt");
        fs::write(&real, b"hello").unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();
        let approved = ApprovedPath::capture(&path).unwrap();

        fs::remove_file(&path).unwrap();
        symlink(&real, &path).unwrap();

        let err = verify_and_open(&approved, true).unwrap_err();
        assert_eq!(err, VerifyError::Symlink);
    }

    #[test]
    fn creates_new_file_after_verifying_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.txt");
        let approved = ApprovedPath::capture(&path).unwrap();
        assert!(!approved.existed);
        assert!(verify_and_open(&approved, true).is_ok());
    }

    #[test]
    fn rejects_already_exists_on_create_race() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.txt");
        let approved = ApprovedPath::capture(&path).unwrap();
        fs::write(&path, b"raced").unwrap();
        let err = verify_and_open(&approved, true).unwrap_err();
        assert_eq!(err, VerifyError::AlreadyExists);
    }
}
