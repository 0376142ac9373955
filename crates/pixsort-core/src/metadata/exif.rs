use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDateTime;
use exif::{Exif, Field, In, Reader, Tag, Value};

use super::gps;
use super::{Extraction, MetadataSource};
use crate::cancel::CancellationToken;
use crate::date::parse_datetime;
use crate::media::Embedded;

/// EXIF date tags in priority order; anything else date-like comes after.
const DATE_TAGS: &[Tag] = &[Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

const TIME_KEYWORDS: &[&str] = &["date", "time"];

/// Embedded-tag reader for JPEG, TIFF and WebP containers.
pub struct ExifReader;

impl MetadataSource for ExifReader {
    fn name(&self) -> &'static str {
        "exif"
    }

    fn extract(&self, path: &Path, _cancel: &CancellationToken) -> Extraction {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => return Extraction::Failed(e.to_string()),
        };
        match Reader::new().read_from_container(&mut BufReader::new(file)) {
            Ok(exif) => from_exif(&exif),
            Err(e) => classify_error(e),
        }
    }
}

/// Map a reader error onto the extraction outcome.
pub(crate) fn classify_error(err: exif::Error) -> Extraction {
    match err {
        exif::Error::NotFound(_) => Extraction::Empty,
        exif::Error::InvalidFormat(_) | exif::Error::NotSupported(_) => Extraction::NotApplicable,
        other => Extraction::Failed(other.to_string()),
    }
}

pub(crate) fn from_exif(exif: &Exif) -> Extraction {
    let embedded = Embedded {
        capture_time: capture_time(exif),
        make: exif.get_field(Tag::Make, In::PRIMARY).and_then(ascii),
        model: exif.get_field(Tag::Model, In::PRIMARY).and_then(ascii),
        latitude: coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef),
        longitude: coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef),
    };
    if embedded.is_empty() {
        Extraction::Empty
    } else {
        Extraction::Found(embedded)
    }
}

fn capture_time(exif: &Exif) -> Option<NaiveDateTime> {
    for tag in DATE_TAGS {
        if let Some(dt) = exif
            .get_field(*tag, In::PRIMARY)
            .and_then(ascii)
            .and_then(|s| parse_datetime(&s))
        {
            return Some(dt);
        }
    }

    exif.fields()
        .filter(|field| !DATE_TAGS.contains(&field.tag))
        .filter(|field| {
            let name = field.tag.to_string().to_ascii_lowercase();
            TIME_KEYWORDS.iter().any(|k| name.contains(k))
        })
        .find_map(|field| ascii(field).and_then(|s| parse_datetime(&s)))
}

fn ascii(field: &Field) -> Option<String> {
    match &field.value {
        Value::Ascii(values) => values
            .first()
            .map(|v| String::from_utf8_lossy(v).trim_end_matches('\0').trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn coordinate(exif: &Exif, tag: Tag, ref_tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let value = match &field.value {
        Value::Rational(r) => match r.as_slice() {
            [d] => d.to_f64(),
            [d, m] => gps::dms_to_decimal(d.to_f64(), m.to_f64(), 0.0),
            [d, m, s, ..] => gps::dms_to_decimal(d.to_f64(), m.to_f64(), s.to_f64()),
            [] => return None,
        },
        Value::SRational(r) => r.first()?.to_f64(),
        Value::Double(v) => *v.first()?,
        Value::Ascii(_) => gps::parse_coordinate(&ascii(field)?)?,
        _ => return None,
    };
    let hemisphere = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(ascii)
        .and_then(|s| s.chars().next())
        .map(|c| c.to_ascii_uppercase());
    Some(gps::apply_hemisphere(value, hemisphere)).filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, ExifFixture};
    use tempfile::tempdir;

    fn extract_bytes(name: &str, bytes: &[u8]) -> Extraction {
        let dir = tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        ExifReader.extract(&path, &CancellationToken::new())
    }

    #[test]
    fn test_full_jpeg() {
        let fixture = ExifFixture {
            original: Some("2023:06:15 14:30:05"),
            digitized: Some("2020:01:01 00:00:00"),
            datetime: Some("2021:01:01 00:00:00"),
            make: Some("Apple"),
            model: Some("iPhone 13"),
            gps: Some((31.2304, -121.4737)),
            ..Default::default()
        };
        let Extraction::Found(found) = extract_bytes("a.jpg", &fixture.jpeg()) else {
            panic!("expected metadata");
        };
        assert_eq!(found.capture_time, Some(test_support::datetime(2023, 6, 15, 14, 30, 5)));
        assert_eq!(found.make.as_deref(), Some("Apple"));
        assert_eq!(found.model.as_deref(), Some("iPhone 13"));
        assert!((found.latitude.unwrap() - 31.2304).abs() < 1e-4);
        assert!((found.longitude.unwrap() + 121.4737).abs() < 1e-4);
    }

    #[test]
    fn test_digitized_then_datetime_priority() {
        let fixture = ExifFixture {
            digitized: Some("2020:02:02 02:02:02"),
            datetime: Some("2021:01:01 00:00:00"),
            ..Default::default()
        };
        let Extraction::Found(found) = extract_bytes("a.tif", &fixture.tiff()) else {
            panic!("expected metadata");
        };
        assert_eq!(found.capture_time, Some(test_support::datetime(2020, 2, 2, 2, 2, 2)));

        let fixture = ExifFixture {
            datetime: Some("2021:01:01 08:00:00"),
            ..Default::default()
        };
        let Extraction::Found(found) = extract_bytes("b.jpg", &fixture.jpeg()) else {
            panic!("expected metadata");
        };
        assert_eq!(found.capture_time, Some(test_support::datetime(2021, 1, 1, 8, 0, 0)));
    }

    #[test]
    fn test_keyword_fallback() {
        let fixture = ExifFixture {
            gps_date: Some("2019:07:04"),
            make: Some("GoPro"),
            ..Default::default()
        };
        let Extraction::Found(found) = extract_bytes("a.jpg", &fixture.jpeg()) else {
            panic!("expected metadata");
        };
        assert_eq!(found.capture_time, Some(test_support::datetime(2019, 7, 4, 0, 0, 0)));
    }

    #[test]
    fn test_jpeg_without_exif_is_empty() {
        let bare = [0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02, 0xFF, 0xD9];
        assert_eq!(extract_bytes("a.jpg", &bare), Extraction::Empty);
    }

    #[test]
    fn test_wrong_container_is_not_applicable() {
        assert_eq!(extract_bytes("a.jpg", b"definitely not an image"), Extraction::NotApplicable);
    }
}
