//! Per-format metadata sources behind one interface.
//!
//! The extension of a file selects an ordered list of sources. The next
//! source is only tried when the current one reports [`Extraction::NotApplicable`]
//! (the file is not what its extension claims); an empty or failed read ends
//! the search and the record falls back to filesystem timestamps.

pub mod exif;
pub mod exiftool;
pub mod gps;
pub mod heic;
pub mod png;

use std::fs;
use std::io;
use std::path::Path;

use crate::cancel::CancellationToken;
use crate::config::TimePolicy;
use crate::date::FsTimes;
use crate::media::{Embedded, MetadataRecord};
use crate::{LogLevel, Reporter};

pub use self::exif::ExifReader;
pub use self::exiftool::ExifTool;
pub use self::heic::HeicReader;
pub use self::png::PngTextReader;

/// Outcome of one source on one file.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Some fields were found.
    Found(Embedded),
    /// The format was right but carried no metadata.
    Empty,
    /// The read was attempted and failed; carries the reason for the log.
    Failed(String),
    /// The file is not in this source's format; try the next source.
    NotApplicable,
}

pub trait MetadataSource {
    fn name(&self) -> &'static str;
    fn extract(&self, path: &Path, cancel: &CancellationToken) -> Extraction;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Exif,
    Heic,
    Png,
    ExifTool,
}

const EXIF_EXTENSIONS: &[&str] = &["jpg", "jpeg", "jpe", "jfif", "tif", "tiff", "webp"];
const HEIC_EXTENSIONS: &[&str] = &["heic", "heif", "hif"];
const RAW_EXTENSIONS: &[&str] = &[
    "3fr", "arw", "cr2", "cr3", "crw", "dcr", "dng", "erf", "iiq", "k25", "kdc", "mef", "mos",
    "mrw", "nef", "nrw", "orf", "pef", "raf", "raw", "rw2", "rwl", "sr2", "srf", "srw", "x3f",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "3g2", "3gp", "avi", "flv", "m2ts", "m4v", "mkv", "mov", "mp4", "mpg", "mpeg", "mts", "webm",
    "wmv",
];
const AUDIO_EXTENSIONS: &[&str] = &["aac", "flac", "m4a", "mp3", "ogg", "wav", "wma"];

/// Sources to try for a lower-case extension, in order. Empty = unsupported.
pub fn sources_for(extension: &str) -> &'static [SourceKind] {
    if EXIF_EXTENSIONS.contains(&extension) {
        &[SourceKind::Exif, SourceKind::ExifTool]
    } else if HEIC_EXTENSIONS.contains(&extension) {
        &[SourceKind::Heic, SourceKind::ExifTool]
    } else if extension == "png" {
        &[SourceKind::Png, SourceKind::ExifTool]
    } else if RAW_EXTENSIONS.contains(&extension)
        || VIDEO_EXTENSIONS.contains(&extension)
        || AUDIO_EXTENSIONS.contains(&extension)
    {
        &[SourceKind::ExifTool]
    } else {
        &[]
    }
}

/// Builds a [`MetadataRecord`] for any file.
pub struct MetadataExtractor<'a> {
    exif: ExifReader,
    heic: HeicReader,
    png: PngTextReader,
    exiftool: Option<&'a ExifTool>,
    policy: TimePolicy,
}

impl<'a> MetadataExtractor<'a> {
    pub fn new(exiftool: Option<&'a ExifTool>, policy: TimePolicy) -> Self {
        Self {
            exif: ExifReader,
            heic: HeicReader,
            png: PngTextReader,
            exiftool,
            policy,
        }
    }

    fn source(&self, kind: SourceKind) -> Option<&dyn MetadataSource> {
        match kind {
            SourceKind::Exif => Some(&self.exif),
            SourceKind::Heic => Some(&self.heic),
            SourceKind::Png => Some(&self.png),
            SourceKind::ExifTool => self.exiftool.map(|tool| tool as &dyn MetadataSource),
        }
    }

    /// Only an unreadable file is an error; missing metadata is not.
    pub fn extract(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        reporter: &Reporter,
    ) -> io::Result<MetadataRecord> {
        let fs_times = FsTimes::from_metadata(&fs::metadata(path)?);
        let embedded = self.embedded(path, cancel, reporter);
        Ok(MetadataRecord::new(embedded, fs_times, self.policy))
    }

    fn embedded(&self, path: &Path, cancel: &CancellationToken, reporter: &Reporter) -> Embedded {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let kinds = sources_for(&extension);
        if kinds.is_empty() {
            reporter.log(
                LogLevel::Warning,
                format!("unsupported format, using file timestamps: {}", path.display()),
            );
            return Embedded::default();
        }

        for &kind in kinds {
            let Some(source) = self.source(kind) else {
                reporter.log(
                    LogLevel::Warning,
                    format!("exiftool not available, using file timestamps: {}", path.display()),
                );
                break;
            };
            match source.extract(path, cancel) {
                Extraction::Found(embedded) => {
                    tracing::debug!(source = source.name(), path = %path.display(), "metadata found");
                    return embedded;
                }
                Extraction::Empty => {
                    tracing::debug!(source = source.name(), path = %path.display(), "no metadata");
                    break;
                }
                Extraction::Failed(reason) => {
                    reporter.log(
                        LogLevel::Warning,
                        format!("{} failed on {}: {}", source.name(), path.display(), reason),
                    );
                    break;
                }
                Extraction::NotApplicable => {
                    tracing::trace!(source = source.name(), path = %path.display(), "not applicable");
                }
            }
        }
        Embedded::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, ExifFixture, Recorder};
    use tempfile::tempdir;

    #[test]
    fn test_dispatch_table() {
        assert_eq!(sources_for("jpg"), &[SourceKind::Exif, SourceKind::ExifTool]);
        assert_eq!(sources_for("heic")[0], SourceKind::Heic);
        assert_eq!(sources_for("png")[0], SourceKind::Png);
        assert_eq!(sources_for("nef"), &[SourceKind::ExifTool]);
        assert_eq!(sources_for("mov"), &[SourceKind::ExifTool]);
        assert!(sources_for("txt").is_empty());
    }

    #[test]
    fn test_unsupported_extension_uses_file_times_and_warns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let recorder = Recorder::new();
        let reporter = recorder.reporter();
        let extractor = MetadataExtractor::new(None, TimePolicy::Capture);
        let record = extractor.extract(&path, &CancellationToken::new(), &reporter).unwrap();
        assert!(record.capture_time.is_none());
        assert_eq!(record.resolved_time, record.create_time.min(record.modify_time));
        assert!(recorder.logged(LogLevel::Warning, "unsupported format"));
    }

    #[test]
    fn test_jpeg_capture_time_is_resolved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        let fixture = ExifFixture {
            original: Some("2023:01:01 09:30:00"),
            make: Some("FUJIFILM"),
            ..Default::default()
        };
        std::fs::write(&path, fixture.jpeg()).unwrap();

        let recorder = Recorder::new();
        let reporter = recorder.reporter();
        let extractor = MetadataExtractor::new(None, TimePolicy::Capture);
        let record = extractor.extract(&path, &CancellationToken::new(), &reporter).unwrap();
        assert_eq!(record.resolved_time, test_support::datetime(2023, 1, 1, 9, 30, 0));
        assert_eq!(record.make.as_deref(), Some("FUJIFILM"));
    }

    #[test]
    fn test_raw_without_exiftool_degrades() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.nef");
        std::fs::write(&path, b"raw").unwrap();

        let recorder = Recorder::new();
        let reporter = recorder.reporter();
        let extractor = MetadataExtractor::new(None, TimePolicy::Capture);
        let record = extractor.extract(&path, &CancellationToken::new(), &reporter).unwrap();
        assert_eq!(record.resolved_time, record.create_time.min(record.modify_time));
        assert!(recorder.logged(LogLevel::Warning, "exiftool not available"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let recorder = Recorder::new();
        let reporter = recorder.reporter();
        let extractor = MetadataExtractor::new(None, TimePolicy::Capture);
        let result = extractor.extract(Path::new("/nonexistent/a.jpg"), &CancellationToken::new(), &reporter);
        assert!(result.is_err());
    }
}
