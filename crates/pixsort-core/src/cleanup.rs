//! Removal of source directories emptied by an in-place move.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::paths;
use crate::{LogLevel, Reporter};

#[cfg(unix)]
const SYSTEM_DIRS: &[&str] = &[
    "/", "/bin", "/boot", "/dev", "/etc", "/home", "/lib", "/opt", "/proc", "/root", "/sbin",
    "/sys", "/tmp", "/usr", "/var", "/Applications", "/System", "/Library", "/Users", "/Volumes",
];

#[cfg(windows)]
const SYSTEM_DIR_VARS: &[&str] = &[
    "SystemRoot",
    "windir",
    "ProgramFiles",
    "ProgramFiles(x86)",
    "ProgramData",
    "APPDATA",
    "LOCALAPPDATA",
    "USERPROFILE",
];

/// Directories that are never deleted, compared after resolution.
#[derive(Debug, Clone, Default)]
pub struct ProtectedPaths {
    paths: HashSet<PathBuf>,
}

impl ProtectedPaths {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            paths: dirs.into_iter().map(|p| paths::resolve(p.as_ref())).collect(),
        }
    }

    /// The source roots plus well-known home, data and system directories.
    pub fn from_environment(roots: &[PathBuf]) -> Self {
        let mut dirs: Vec<PathBuf> = roots.to_vec();
        if let Some(user) = directories::UserDirs::new() {
            dirs.push(user.home_dir().to_path_buf());
            dirs.extend(
                [
                    user.audio_dir(),
                    user.desktop_dir(),
                    user.document_dir(),
                    user.download_dir(),
                    user.picture_dir(),
                    user.public_dir(),
                    user.video_dir(),
                ]
                .into_iter()
                .flatten()
                .map(Path::to_path_buf),
            );
        }
        if let Some(base) = directories::BaseDirs::new() {
            dirs.extend(
                [base.config_dir(), base.data_dir(), base.data_local_dir(), base.cache_dir()]
                    .into_iter()
                    .map(Path::to_path_buf),
            );
        }
        #[cfg(unix)]
        dirs.extend(SYSTEM_DIRS.iter().map(PathBuf::from));
        #[cfg(windows)]
        dirs.extend(
            SYSTEM_DIR_VARS
                .iter()
                .filter_map(|var| std::env::var_os(var))
                .map(PathBuf::from),
        );
        Self::new(dirs)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(&paths::resolve(path))
    }
}

/// Delete touched directories, everything below them, and their ancestors
/// below a root, wherever they are empty once their children have been
/// dealt with. Roots and protected paths always survive. Returns the number
/// of directories removed.
pub fn cleanup(
    touched: &HashSet<PathBuf>,
    roots: &[PathBuf],
    protected: &ProtectedPaths,
    reporter: &Reporter,
) -> usize {
    let roots: Vec<PathBuf> = roots.iter().map(|r| paths::resolve(r)).collect();
    let mut candidates: HashSet<PathBuf> = HashSet::new();
    for dir in touched {
        let dir = paths::resolve(dir);
        let Some(root) = roots.iter().filter(|r| dir.starts_with(r)).max_by_key(|r| r.components().count()) else {
            continue;
        };
        let mut current = Some(dir.as_path());
        while let Some(path) = current {
            if path == root.as_path() {
                break;
            }
            candidates.insert(path.to_path_buf());
            current = path.parent();
        }
    }

    let mut ordered: Vec<PathBuf> = candidates.into_iter().collect();
    ordered.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });

    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut removed = 0;
    for candidate in ordered {
        if !is_real_dir(&candidate) {
            continue;
        }
        // children before parents; symlinks are never entered
        let walker = WalkDir::new(&candidate)
            .follow_links(false)
            .follow_root_links(false)
            .contents_first(true);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    reporter.log(LogLevel::Debug, format!("skipping during cleanup: {e}"));
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let dir = entry.into_path();
            if !visited.insert(dir.clone()) {
                continue;
            }
            if remove_if_empty(&dir, &roots, protected, reporter) {
                removed += 1;
            }
        }
    }
    removed
}

fn remove_if_empty(dir: &Path, roots: &[PathBuf], protected: &ProtectedPaths, reporter: &Reporter) -> bool {
    if roots.iter().any(|root| root == dir) || protected.contains(dir) {
        return false;
    }
    if !is_real_dir(dir) || !is_empty_dir(dir) {
        return false;
    }
    match fs::remove_dir(dir) {
        Ok(()) => {
            reporter.log(LogLevel::Debug, format!("removed empty folder {}", dir.display()));
            true
        }
        Err(e) => {
            reporter.log(
                LogLevel::Warning,
                format!("could not remove {}: {}", dir.display(), e),
            );
            false
        }
    }
}

fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).map(|meta| meta.is_dir()).unwrap_or(false)
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
