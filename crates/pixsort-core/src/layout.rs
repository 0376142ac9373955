use std::path::{Path, PathBuf};

use crate::config::{ClassLevel, Labels};
use crate::geo::Place;
use crate::media::{MediaKind, MetadataRecord};
use crate::naming::{self, replace_reserved};

/// Everything known about one file when its target is computed.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub record: &'a MetadataRecord,
    pub place: &'a Place,
    pub kind: MediaKind,
    pub original: &'a Path,
}

impl<'a> Subject<'a> {
    pub fn original_stem(&self) -> String {
        self.original
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Lower-case extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        self.original
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
    }

    pub fn make<'l>(&'l self, labels: &'l Labels) -> &'l str {
        self.record.make.as_deref().unwrap_or(&labels.unknown_device)
    }

    pub fn model<'l>(&'l self, labels: &'l Labels) -> &'l str {
        self.record.model.as_deref().unwrap_or(&labels.unknown_device)
    }
}

/// Destination directories from the classification levels.
pub struct PathBuilder<'a> {
    levels: &'a [ClassLevel],
    labels: &'a Labels,
}

impl<'a> PathBuilder<'a> {
    pub fn new(levels: &'a [ClassLevel], labels: &'a Labels) -> Self {
        Self { levels, labels }
    }

    /// `base` plus one segment per level, then the file-type bucket.
    /// With no levels the base is returned unchanged.
    pub fn build(&self, base: &Path, subject: &Subject) -> PathBuf {
        let mut dir = base.to_path_buf();
        let mut depth = 0;
        for level in self.levels {
            if *level == ClassLevel::None {
                break;
            }
            dir.push(segment(&self.render(*level, subject)));
            depth += 1;
        }
        if depth > 0 && !self.levels[..depth].contains(&ClassLevel::FileType) {
            dir.push(segment(subject.kind.label(self.labels)));
        }
        dir
    }

    fn render(&self, level: ClassLevel, subject: &Subject) -> String {
        let time = &subject.record.resolved_time;
        match level {
            ClassLevel::Year => naming::year(time),
            ClassLevel::Month => naming::month(time),
            ClassLevel::Day => naming::day(time),
            ClassLevel::Weekday => naming::weekday(time, self.labels).to_string(),
            ClassLevel::DeviceMake => subject.make(self.labels).to_string(),
            ClassLevel::DeviceModel => subject.model(self.labels).to_string(),
            ClassLevel::Province => subject.place.province_name(self.labels).to_string(),
            ClassLevel::City => subject.place.city_name(self.labels).to_string(),
            ClassLevel::FileType => subject.kind.label(self.labels).to_string(),
            ClassLevel::Extension => subject
                .extension()
                .map(|e| e.to_ascii_uppercase())
                .unwrap_or_else(|| self.labels.other.clone()),
            ClassLevel::None => String::new(),
        }
    }
}

/// A single directory component: no separators, no trailing dots or spaces.
fn segment(text: &str) -> String {
    let cleaned = replace_reserved(text);
    let trimmed = cleaned.trim().trim_end_matches('.');
    match trimmed {
        "" | "." | ".." => "_".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimePolicy;
    use crate::date::FsTimes;
    use crate::media::Embedded;
    use crate::test_support;

    fn record() -> MetadataRecord {
        let embedded = Embedded {
            capture_time: Some(test_support::datetime(2024, 2, 20, 10, 0, 0)),
            make: Some("NIKON CORPORATION".into()),
            ..Default::default()
        };
        let fs = FsTimes {
            created: None,
            modified: test_support::datetime(2024, 3, 1, 0, 0, 0),
        };
        MetadataRecord::new(embedded, fs, TimePolicy::Capture)
    }

    fn build(levels: &[ClassLevel], kind: MediaKind, original: &str) -> PathBuf {
        let labels = Labels::default();
        let record = record();
        let place = Place {
            province: Some("Guangdong".into()),
            city: None,
        };
        let subject = Subject {
            record: &record,
            place: &place,
            kind,
            original: Path::new(original),
        };
        PathBuilder::new(levels, &labels).build(Path::new("/out"), &subject)
    }

    #[test]
    fn test_no_levels_is_base() {
        assert_eq!(build(&[], MediaKind::Image, "a.jpg"), PathBuf::from("/out"));
        assert_eq!(build(&[ClassLevel::None, ClassLevel::Year], MediaKind::Image, "a.jpg"), PathBuf::from("/out"));
    }

    #[test]
    fn test_date_levels_with_type_bucket() {
        let levels = [ClassLevel::Year, ClassLevel::Month, ClassLevel::Day, ClassLevel::Weekday];
        assert_eq!(
            build(&levels, MediaKind::Video, "a.mov"),
            PathBuf::from("/out/2024/02/20/Tuesday/video")
        );
    }

    #[test]
    fn test_none_truncates_later_levels() {
        let levels = [ClassLevel::Year, ClassLevel::None, ClassLevel::Month];
        assert_eq!(build(&levels, MediaKind::Image, "a.jpg"), PathBuf::from("/out/2024/image"));
    }

    #[test]
    fn test_device_and_geography_sentinels() {
        let levels = [ClassLevel::DeviceMake, ClassLevel::DeviceModel, ClassLevel::Province, ClassLevel::City];
        assert_eq!(
            build(&levels, MediaKind::Audio, "a.mp3"),
            PathBuf::from("/out/NIKON CORPORATION/Unknown Device/Guangdong/Unknown City/audio")
        );
    }

    #[test]
    fn test_explicit_file_type_and_extension() {
        let levels = [ClassLevel::FileType, ClassLevel::Extension];
        assert_eq!(build(&levels, MediaKind::Image, "a.jpeg"), PathBuf::from("/out/image/JPEG"));
        assert_eq!(build(&[ClassLevel::Extension], MediaKind::Other, "README"), PathBuf::from("/out/other/other"));
    }

    #[test]
    fn test_segment_sanitizing() {
        assert_eq!(segment("AC/DC"), "AC_DC");
        assert_eq!(segment("Corp. "), "Corp");
        assert_eq!(segment(".."), "_");
    }
}
