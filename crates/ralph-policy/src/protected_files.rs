use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Basenames that are always protected, regardless of directory.
const PROTECTED_BASENAMES: &[&str] = &["ralph.config.json", ".env"];
/// Basename prefixes that are always protected (e.g. `.env.production`).
const PROTECTED_BASENAME_PREFIXES: &[&str] = &[".env."];
/// Glob patterns matched against the normalized absolute path.
const PROTECTED_GLOBS: &[&str] = &["**/.ralph/config.json"];

const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Cache of `(device, inode)` tuples for known sensitive files, so a
/// write-class tool can be blocked even if the path has been renamed,
/// hardlinked, or otherwise disguised since the cache was built
/// (spec.md §4.1). Refreshed lazily every 30s and forcibly before every
/// batch via `refresh_now`.
pub struct ProtectedFileCache {
    globs: GlobSet,
    state: Mutex<CacheState>,
    /// Roots to scan for protected files when refreshing (typically the
    /// workspace root and the user's home directory).
    scan_roots: Vec<PathBuf>,
}

struct CacheState {
    inodes: Vec<(u64, u64)>,
    last_refresh: Option<Instant>,
}

impl ProtectedFileCache {
    /// Builds a cache that scans `scan_roots` for protected files.
    pub fn new(scan_roots: Vec<PathBuf>) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in PROTECTED_GLOBS {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        let globs = builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap());
        Self {
            globs,
            state: Mutex::new(CacheState {
                inodes: Vec::new(),
                last_refresh: None,
            }),
            scan_roots,
        }
    }

    /// Whether `path` is protected: basename match, glob match over the
    /// normalized absolute path, or an inode match against the cached set
    /// (catches hardlinks and rename-atop-a-protected-path).
    pub fn is_protected(&self, path: &Path) -> bool {
        self.refresh_if_stale();

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if PROTECTED_BASENAMES.contains(&name) {
                return true;
            }
            if PROTECTED_BASENAME_PREFIXES
                .iter()
                .any(|prefix| name.starts_with(prefix))
            {
                return true;
            }
        }

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        if self.globs.is_match(&absolute) {
            return true;
        }

        if let Ok(meta) = std::fs::symlink_metadata(&absolute) {
            let key = (meta.dev(), meta.ino());
            let state = self.state.lock().expect("protected cache mutex poisoned");
            if state.inodes.contains(&key) {
                return true;
            }
        }

        false
    }

    fn refresh_if_stale(&self) {
        let needs_refresh = {
            let state = self.state.lock().expect("protected cache mutex poisoned");
            match state.last_refresh {
                Some(last) => last.elapsed() >= REFRESH_INTERVAL,
                None => true,
            }
        };
        if needs_refresh {
            self.refresh_now();
        }
    }

    /// Forces an immediate rescan. Called at every batch boundary
    /// (spec.md §4.1: "forcibly before every batch").
    pub fn refresh_now(&self) {
        let mut inodes = Vec::new();
        for root in &self.scan_roots {
            for basename in PROTECTED_BASENAMES {
                let candidate = root.join(basename);
                if let Ok(meta) = std::fs::symlink_metadata(&candidate) {
                    inodes.push((meta.dev(), meta.ino()));
                }
            }
            let dot_ralph = root.join(".ralph").join("config.json");
            if let Ok(meta) = std::fs::symlink_metadata(&dot_ralph) {
                inodes.push((meta.dev(), meta.ino()));
            }
        }
        let mut state = self.state.lock().expect("protected cache mutex poisoned");
        state.inodes = inodes;
        state.last_refresh = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn basename_exact_match() {
        let cache = ProtectedFileCache::new(vec![]);
        assert!(cache.is_protected(Path::new("/some/dir/.env")));
        assert!(cache.is_protected(Path::new("/some/dir/ralph.config.json")));
        assert!(!cache.is_protected(Path::new("/some/dir/notes.txt")));
    }

    #[test]
    fn basename_prefix_match() {
        let cache = ProtectedFileCache::new(vec![]);
        assert!(cache.is_protected(Path::new("/some/dir/.env.production")));
    }

    #[test]
    fn glob_match() {
        let cache = ProtectedFileCache::new(vec![]);
        assert!(cache.is_protected(Path::new("/home/user/project/.ralph/config.json")));
    }

    #[test]
    fn inode_match_catches_hardlink_disguise() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(&env_path, b"SECRET=1").unwrap();
        let cache = ProtectedFileCache::new(vec![dir.path().to_path_buf()]);
        cache.refresh_now();

        let disguised = dir.path().join("not_obviously_protected.txt");
        fs::hard_link(&env_path, &disguised).unwrap();
        assert!(cache.is_protected(&disguised));
    }
}
