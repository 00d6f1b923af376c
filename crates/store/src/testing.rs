//! Test helpers.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Makes a directory read-only until dropped.
///
/// `lock` returns `None` when the process can still create files in the
/// locked directory (running as root), since write failures cannot be
/// provoked that way.
pub(crate) struct ReadOnlyDir(PathBuf);

impl ReadOnlyDir {
    pub(crate) fn lock(dir: &Path) -> Option<Self> {
        fs::set_permissions(dir, fs::Permissions::from_mode(0o555)).ok()?;
        let guard = Self(dir.to_path_buf());

        let check = dir.join(".write-check");
        if fs::write(&check, b"").is_ok() {
            let _ = fs::remove_file(&check);
            return None;
        }
        Some(guard)
    }
}

impl Drop for ReadOnlyDir {
    fn drop(&mut self) {
        let _ = fs::set_permissions(&self.0, fs::Permissions::from_mode(0o755));
    }
}
