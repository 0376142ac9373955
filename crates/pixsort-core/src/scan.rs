use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::cancel::{CancellationToken, Cancelled};
use crate::config::FolderSpec;
use crate::{LogLevel, Reporter};

/// Regular files of one folder in a stable (name-sorted) order.
///
/// Anything under `exclude` is skipped, as are symlinks. Unreadable
/// entries are logged and skipped. Cancellation is checked per entry.
pub fn list_files(
    folder: &FolderSpec,
    exclude: Option<&Path>,
    cancel: &CancellationToken,
    reporter: &Reporter,
) -> Result<Vec<PathBuf>, Cancelled> {
    let max_depth = if folder.include_subfolders { usize::MAX } else { 1 };
    let walker = WalkDir::new(&folder.path)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| exclude.map_or(true, |ex| entry.path() != ex));

    let mut files = Vec::new();
    for entry in walker {
        cancel.check()?;
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => reporter.log(
                LogLevel::Warning,
                format!("cannot read {}: {}", e.path().unwrap_or(&folder.path).display(), e),
            ),
        }
    }
    Ok(files)
}
