use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::cancel::CancellationToken;
use crate::config::TransferMode;
use crate::error::TransferError;
use crate::paths;

/// Copy buffer size; cancellation is checked once per chunk.
pub const CHUNK_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transferred {
    /// The file now lives at this path.
    Written(PathBuf),
    /// The computed target was the file itself; nothing was touched.
    InPlace,
}

/// `stem.ext`, or `stem_n.ext` for the n-th collision.
pub fn target_name(stem: &str, extension: Option<&str>, counter: u32) -> String {
    let stem = if counter == 0 {
        stem.to_string()
    } else {
        format!("{stem}_{counter}")
    };
    match extension {
        Some(ext) if !ext.is_empty() => format!("{stem}.{ext}"),
        _ => stem,
    }
}

/// Copy or move `source` into `target_dir` as `stem.ext`, never
/// overwriting an existing file.
pub fn transfer(
    source: &Path,
    target_dir: &Path,
    stem: &str,
    extension: Option<&str>,
    mode: TransferMode,
    cancel: &CancellationToken,
) -> Result<Transferred, TransferError> {
    let source_meta = fs::metadata(source).map_err(|e| TransferError::io(source, e))?;
    fs::create_dir_all(target_dir).map_err(|e| TransferError::io(target_dir, e))?;

    let resolved_source = paths::resolve(source);
    let mut counter = 0;
    loop {
        let candidate = target_dir.join(target_name(stem, extension, counter));
        counter += 1;
        if paths::resolve(&candidate) == resolved_source {
            return Ok(Transferred::InPlace);
        }
        if fs::symlink_metadata(&candidate).is_ok() {
            continue;
        }
        let written = match mode {
            TransferMode::Copy => copy_new(source, &candidate, &source_meta, cancel)?,
            TransferMode::Move => move_new(source, &candidate, &source_meta, cancel)?,
        };
        if written {
            return Ok(Transferred::Written(candidate));
        }
        // lost a race for the name; try the next suffix
    }
}

/// Returns `false` when the target appeared before it could be created.
fn copy_new(
    source: &Path,
    target: &Path,
    source_meta: &fs::Metadata,
    cancel: &CancellationToken,
) -> Result<bool, TransferError> {
    let mut input = File::open(source).map_err(|e| TransferError::io(source, e))?;
    let mut output = match OpenOptions::new().write(true).create_new(true).open(target) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(TransferError::io(target, e)),
    };

    let result = copy_chunks(&mut input, &mut output, source, target, cancel);
    drop(output);
    if let Err(e) = result {
        let _ = fs::remove_file(target);
        return Err(e);
    }

    if let Err(e) = fs::set_permissions(target, source_meta.permissions()) {
        tracing::debug!(target = %target.display(), error = %e, "could not copy permissions");
    }
    let atime = FileTime::from_last_access_time(source_meta);
    let mtime = FileTime::from_last_modification_time(source_meta);
    if let Err(e) = filetime::set_file_times(target, atime, mtime) {
        tracing::debug!(target = %target.display(), error = %e, "could not preserve timestamps");
    }
    Ok(true)
}

fn copy_chunks(
    input: &mut File,
    output: &mut File,
    source: &Path,
    target: &Path,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::io(source, e)),
        };
        output
            .write_all(&buf[..n])
            .map_err(|e| TransferError::io(target, e))?;
    }
    output.flush().map_err(|e| TransferError::io(target, e))
}

/// Hard-link then unlink, which fails instead of replacing an existing
/// target. Where linking is impossible (other filesystem, no link support)
/// fall back to an exclusive copy + delete.
fn move_new(
    source: &Path,
    target: &Path,
    source_meta: &fs::Metadata,
    cancel: &CancellationToken,
) -> Result<bool, TransferError> {
    match fs::hard_link(source, target) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(target);
                return Err(TransferError::io(source, e));
            }
            return Ok(true);
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            tracing::debug!(source = %source.display(), error = %e, "hard link failed, copying instead");
        }
    }
    if !copy_new(source, target, source_meta, cancel)? {
        return Ok(false);
    }
    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(target);
        return Err(TransferError::io(source, e));
    }
    Ok(true)
}
