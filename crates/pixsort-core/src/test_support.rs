//! Synthetic media files and an event recorder for unit tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};

use crate::{Event, EventCallback, LogLevel, Reporter};

pub(crate) fn datetime(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, mi, s)
        .unwrap()
}

/// Collects every event a run emits.
pub(crate) struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
    callback: Box<EventCallback>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        Self {
            events,
            callback: Box::new(move |event| sink.lock().unwrap().push(event)),
        }
    }

    pub(crate) fn callback(&self) -> &EventCallback {
        &*self.callback
    }

    pub(crate) fn reporter(&self) -> Reporter<'_> {
        Reporter::new(self.callback())
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn logged(&self, level: LogLevel, needle: &str) -> bool {
        self.events().iter().any(|event| {
            matches!(event, Event::Log { level: l, message } if *l == level && message.contains(needle))
        })
    }

    pub(crate) fn progress(&self) -> Vec<u8> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                Event::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }
}

/// EXIF fields to bake into a little-endian TIFF block.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExifFixture {
    pub original: Option<&'static str>,
    pub digitized: Option<&'static str>,
    pub datetime: Option<&'static str>,
    pub make: Option<&'static str>,
    pub model: Option<&'static str>,
    /// `(latitude, longitude)`, signed.
    pub gps: Option<(f64, f64)>,
    pub gps_date: Option<&'static str>,
}

struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

fn ascii(tag: u16, text: &str) -> Entry {
    let mut data = text.as_bytes().to_vec();
    data.push(0);
    Entry {
        tag,
        kind: 2,
        count: data.len() as u32,
        data,
    }
}

fn rationals(tag: u16, values: &[(u32, u32)]) -> Entry {
    let mut data = Vec::new();
    for (num, denom) in values {
        data.extend_from_slice(&num.to_le_bytes());
        data.extend_from_slice(&denom.to_le_bytes());
    }
    Entry {
        tag,
        kind: 5,
        count: values.len() as u32,
        data,
    }
}

fn long(tag: u16, value: u32) -> Entry {
    Entry {
        tag,
        kind: 4,
        count: 1,
        data: value.to_le_bytes().to_vec(),
    }
}

fn dms(value: f64) -> [(u32, u32); 3] {
    let value = value.abs();
    let degrees = value.trunc();
    let minutes = ((value - degrees) * 60.0).trunc();
    let seconds = ((value - degrees) * 60.0 - minutes) * 60.0;
    [
        (degrees as u32, 1),
        (minutes as u32, 1),
        ((seconds * 10_000.0).round() as u32, 10_000),
    ]
}

fn ifd_len(entries: usize) -> usize {
    2 + 12 * entries + 4
}

fn write_ifd(out: &mut Vec<u8>, mut entries: Vec<Entry>, data_offset: usize, data: &mut Vec<u8>) {
    entries.sort_by_key(|e| e.tag);
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&entry.kind.to_le_bytes());
        out.extend_from_slice(&entry.count.to_le_bytes());
        if entry.data.len() <= 4 {
            let mut inline = entry.data.clone();
            inline.resize(4, 0);
            out.extend_from_slice(&inline);
        } else {
            let offset = data_offset + data.len();
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            data.extend_from_slice(&entry.data);
            if data.len() % 2 == 1 {
                data.push(0);
            }
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
}

impl ExifFixture {
    pub(crate) fn tiff(&self) -> Vec<u8> {
        let mut ifd0 = Vec::new();
        if let Some(make) = self.make {
            ifd0.push(ascii(0x010F, make));
        }
        if let Some(model) = self.model {
            ifd0.push(ascii(0x0110, model));
        }
        if let Some(dt) = self.datetime {
            ifd0.push(ascii(0x0132, dt));
        }

        let mut exif = Vec::new();
        if let Some(dt) = self.original {
            exif.push(ascii(0x9003, dt));
        }
        if let Some(dt) = self.digitized {
            exif.push(ascii(0x9004, dt));
        }

        let mut gps = Vec::new();
        if let Some((lat, lon)) = self.gps {
            gps.push(ascii(0x0001, if lat < 0.0 { "S" } else { "N" }));
            gps.push(rationals(0x0002, &dms(lat)));
            gps.push(ascii(0x0003, if lon < 0.0 { "W" } else { "E" }));
            gps.push(rationals(0x0004, &dms(lon)));
        }
        if let Some(date) = self.gps_date {
            gps.push(ascii(0x001D, date));
        }

        let ifd0_entries = ifd0.len() + usize::from(!exif.is_empty()) + usize::from(!gps.is_empty());
        let exif_offset = 8 + ifd_len(ifd0_entries);
        let gps_offset = exif_offset + if exif.is_empty() { 0 } else { ifd_len(exif.len()) };
        let data_offset = gps_offset + if gps.is_empty() { 0 } else { ifd_len(gps.len()) };
        if !exif.is_empty() {
            ifd0.push(long(0x8769, exif_offset as u32));
        }
        if !gps.is_empty() {
            ifd0.push(long(0x8825, gps_offset as u32));
        }

        let mut out = b"II*\0".to_vec();
        out.extend_from_slice(&8u32.to_le_bytes());
        let mut data = Vec::new();
        write_ifd(&mut out, ifd0, data_offset, &mut data);
        if !exif.is_empty() {
            write_ifd(&mut out, exif, data_offset, &mut data);
        }
        if !gps.is_empty() {
            write_ifd(&mut out, gps, data_offset, &mut data);
        }
        out.extend_from_slice(&data);
        out
    }

    /// Minimal JPEG: SOI, APP1 Exif, EOI.
    pub(crate) fn jpeg(&self) -> Vec<u8> {
        let tiff = self.tiff();
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
        out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(&tiff);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    pub(crate) fn write_jpeg(&self, path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, self.jpeg()).unwrap();
    }
}

/// A PNG with a 1x1 header, the given chunks, and IEND.
pub(crate) fn png(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
    fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        let mut crc = flate2::Crc::new();
        crc.update(kind);
        crc.update(data);
        out.extend_from_slice(&crc.sum().to_be_bytes());
    }

    let mut out = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);
    chunk(&mut out, b"IHDR", &ihdr);
    for (kind, data) in chunks {
        chunk(&mut out, kind, data);
    }
    chunk(&mut out, b"IEND", &[]);
    out
}

/// GeoJSON of axis-aligned squares: `(name, min_lon, min_lat, size)`.
pub(crate) fn write_geojson(dir: &Path, file: &str, squares: &[(&str, f64, f64, f64)]) -> PathBuf {
    let features: Vec<serde_json::Value> = squares
        .iter()
        .map(|(name, lon, lat, size)| {
            serde_json::json!({
                "type": "Feature",
                "properties": {"name": name},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [lon, lat],
                        [lon + size, lat],
                        [lon + size, lat + size],
                        [lon, lat + size],
                        [lon, lat]
                    ]]
                }
            })
        })
        .collect();
    let path = dir.join(file);
    let json = serde_json::json!({"type": "FeatureCollection", "features": features});
    std::fs::write(&path, json.to_string()).unwrap();
    path
}

/// Shell script standing in for the external metadata tool.
#[cfg(unix)]
pub(crate) fn fake_exiftool(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-exiftool");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
