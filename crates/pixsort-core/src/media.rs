use std::path::Path;

use chrono::NaiveDateTime;

use crate::config::{Labels, TimePolicy};
use crate::date::{self, FsTimes};

/// Fields a metadata source found inside the file. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embedded {
    pub capture_time: Option<NaiveDateTime>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Embedded {
    pub fn is_empty(&self) -> bool {
        self == &Embedded::default()
    }

    /// Both coordinates, when present and within range.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if valid_coordinates(lat, lon) => Some((lat, lon)),
            _ => None,
        }
    }
}

fn valid_coordinates(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
}

/// Canonical per-file metadata. Built once per file and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub capture_time: Option<NaiveDateTime>,
    pub create_time: NaiveDateTime,
    pub modify_time: NaiveDateTime,
    pub resolved_time: NaiveDateTime,
    pub make: Option<String>,
    pub model: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl MetadataRecord {
    pub fn new(embedded: Embedded, fs: FsTimes, policy: TimePolicy) -> Self {
        let coordinates = embedded.coordinates();
        Self {
            resolved_time: date::resolve(embedded.capture_time, fs.created, fs.modified, policy),
            capture_time: embedded.capture_time,
            create_time: fs.created.unwrap_or(fs.modified),
            modify_time: fs.modified,
            make: clean(embedded.make),
            model: clean(embedded.model),
            latitude: coordinates.map(|(lat, _)| lat),
            longitude: coordinates.map(|(_, lon)| lon),
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
        .filter(|v| !v.is_empty())
}

/// Broad file-type bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Other,
}

impl MediaKind {
    /// Sniff the file's magic bytes, falling back to its extension.
    pub fn detect(path: &Path) -> Self {
        if let Ok(Some(kind)) = infer::get_from_path(path) {
            match kind.matcher_type() {
                infer::MatcherType::Image => return MediaKind::Image,
                infer::MatcherType::Video => return MediaKind::Video,
                infer::MatcherType::Audio => return MediaKind::Audio,
                _ => {}
            }
        }
        Self::from_extension(path)
    }

    pub fn from_extension(path: &Path) -> Self {
        let lower = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        // Not in the MIME tables
        if matches!(lower.as_str(), "mts" | "m2ts") {
            return MediaKind::Video;
        }
        match mime_guess::from_path(path).first() {
            Some(m) if m.type_() == mime_guess::mime::IMAGE => MediaKind::Image,
            Some(m) if m.type_() == mime_guess::mime::VIDEO => MediaKind::Video,
            Some(m) if m.type_() == mime_guess::mime::AUDIO => MediaKind::Audio,
            _ => MediaKind::Other,
        }
    }

    pub fn label(self, labels: &Labels) -> &str {
        match self {
            MediaKind::Image => &labels.image,
            MediaKind::Video => &labels.video,
            MediaKind::Audio => &labels.audio,
            MediaKind::Other => &labels.other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn fs_times() -> FsTimes {
        FsTimes {
            created: None,
            modified: NaiveDate::from_ymd_opt(2020, 2, 2).unwrap().and_hms_opt(8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_record_without_metadata_resolves_to_modify_time() {
        let record = MetadataRecord::new(Embedded::default(), fs_times(), TimePolicy::Capture);
        assert_eq!(record.resolved_time, fs_times().modified);
        assert_eq!(record.create_time, fs_times().modified);
        assert!(record.make.is_none());
        assert!(record.coordinates().is_none());
    }

    #[test]
    fn test_record_drops_blank_strings_and_bad_coordinates() {
        let embedded = Embedded {
            make: Some("  Canon\0".into()),
            model: Some("   ".into()),
            latitude: Some(123.0),
            longitude: Some(10.0),
            ..Default::default()
        };
        let record = MetadataRecord::new(embedded, fs_times(), TimePolicy::Capture);
        assert_eq!(record.make.as_deref(), Some("Canon"));
        assert!(record.model.is_none());
        assert!(record.latitude.is_none());
    }

    #[test]
    fn test_kind_from_content_and_extension() {
        let dir = tempdir().unwrap();
        let disguised = dir.path().join("photo.dat");
        std::fs::write(&disguised, [0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0]).unwrap();
        assert_eq!(MediaKind::detect(&disguised), MediaKind::Image);

        assert_eq!(MediaKind::from_extension(Path::new("a.MOV")), MediaKind::Video);
        assert_eq!(MediaKind::from_extension(Path::new("a.mts")), MediaKind::Video);
        assert_eq!(MediaKind::from_extension(Path::new("a.mp3")), MediaKind::Audio);
        assert_eq!(MediaKind::from_extension(Path::new("a.txt")), MediaKind::Other);
    }
}
