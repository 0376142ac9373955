//! PNG text chunks (`tEXt`, `zTXt`, `iTXt`), embedded XMP and `eXIf`.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use flate2::read::ZlibDecoder;
use regex::Regex;

use super::exif::from_exif;
use super::gps;
use super::{Extraction, MetadataSource};
use crate::cancel::CancellationToken;
use crate::date::parse_datetime;
use crate::media::Embedded;

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const MAX_TEXT_CHUNK: u32 = 16 * 1024 * 1024;

const DATE_KEYS: &[&str] = &[
    "exif:datetimeoriginal",
    "datetimeoriginal",
    "creation time",
    "xmp:createdate",
    "photoshop:datecreated",
    "date:create",
];

static XMP_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z]+:[A-Za-z]+)\s*=\s*"([^"]*)""#).unwrap());
static XMP_ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z]+:[A-Za-z]+)>([^<]+)</([A-Za-z]+:[A-Za-z]+)>").unwrap()
});

pub struct PngTextReader;

impl MetadataSource for PngTextReader {
    fn name(&self) -> &'static str {
        "png"
    }

    fn extract(&self, path: &Path, cancel: &CancellationToken) -> Extraction {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => return Extraction::Failed(e.to_string()),
        };
        let mut reader = BufReader::new(file);
        let mut signature = [0u8; 8];
        match reader.read_exact(&mut signature) {
            Ok(()) if signature == SIGNATURE => {}
            Ok(()) => return Extraction::NotApplicable,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Extraction::NotApplicable,
            Err(e) => return Extraction::Failed(e.to_string()),
        }

        let chunks = match read_chunks(&mut reader, cancel) {
            Ok(chunks) => chunks,
            Err(e) => return Extraction::Failed(e.to_string()),
        };
        let from_text = from_text(&chunks.texts);
        let embedded = match chunks.exif {
            Some(exif) => merge(exif, from_text),
            None => from_text,
        };
        if embedded.is_empty() {
            Extraction::Empty
        } else {
            Extraction::Found(embedded)
        }
    }
}

#[derive(Default)]
struct Chunks {
    texts: Vec<(String, String)>,
    exif: Option<Embedded>,
}

fn read_chunks<R: Read + io::Seek>(reader: &mut BufReader<R>, cancel: &CancellationToken) -> io::Result<Chunks> {
    let mut chunks = Chunks::default();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let mut head = [0u8; 8];
        match reader.read_exact(&mut head) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        let len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
        let kind = &head[4..8];
        match kind {
            b"IEND" => break,
            b"tEXt" | b"zTXt" | b"iTXt" | b"eXIf" => {
                if len > MAX_TEXT_CHUNK {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "oversized text chunk"));
                }
                let mut data = vec![0u8; len as usize];
                reader.read_exact(&mut data)?;
                reader.seek_relative(4)?;
                match kind {
                    b"tEXt" => chunks.texts.extend(text_chunk(&data)),
                    b"zTXt" => chunks.texts.extend(ztxt_chunk(&data)),
                    b"iTXt" => chunks.texts.extend(itxt_chunk(&data)),
                    _ => {
                        if let Ok(exif) = exif::Reader::new().read_raw(data) {
                            if let Extraction::Found(found) = from_exif(&exif) {
                                chunks.exif = Some(found);
                            }
                        }
                    }
                }
            }
            _ => reader.seek_relative(i64::from(len) + 4)?,
        }
    }

    let xmp: Vec<(String, String)> = chunks
        .texts
        .iter()
        .filter(|(key, value)| key == "XML:com.adobe.xmp" || value.contains("<x:xmpmeta"))
        .flat_map(|(_, value)| xmp_pairs(value))
        .collect();
    chunks.texts.extend(xmp);
    Ok(chunks)
}

fn latin1(bytes: &[u8]) -> String {
    encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned()
}

fn inflate(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(bytes).read_to_end(&mut out).ok()?;
    Some(out)
}

fn split_keyword(data: &[u8]) -> Option<(String, &[u8])> {
    let nul = data.iter().position(|&b| b == 0)?;
    Some((latin1(&data[..nul]), &data[nul + 1..]))
}

fn text_chunk(data: &[u8]) -> Option<(String, String)> {
    let (key, rest) = split_keyword(data)?;
    Some((key, latin1(rest)))
}

fn ztxt_chunk(data: &[u8]) -> Option<(String, String)> {
    let (key, rest) = split_keyword(data)?;
    // compression method byte, always 0 (zlib)
    let text = inflate(rest.get(1..)?)?;
    Some((key, latin1(&text)))
}

fn itxt_chunk(data: &[u8]) -> Option<(String, String)> {
    let (key, rest) = split_keyword(data)?;
    let compressed = *rest.first()? == 1;
    let rest = rest.get(2..)?;
    // language tag, then translated keyword
    let lang_end = rest.iter().position(|&b| b == 0)?;
    let rest = &rest[lang_end + 1..];
    let translated_end = rest.iter().position(|&b| b == 0)?;
    let text = &rest[translated_end + 1..];
    let text = if compressed { inflate(text)? } else { text.to_vec() };
    Some((key, String::from_utf8_lossy(&text).into_owned()))
}

fn xmp_pairs(xmp: &str) -> Vec<(String, String)> {
    let attributes = XMP_ATTR_RE
        .captures_iter(xmp)
        .map(|c| (c[1].to_string(), c[2].trim().to_string()));
    let elements = XMP_ELEMENT_RE
        .captures_iter(xmp)
        .filter(|c| c[1] == c[3])
        .map(|c| (c[1].to_string(), c[2].trim().to_string()));
    attributes.chain(elements).collect()
}

fn from_text(pairs: &[(String, String)]) -> Embedded {
    let lookup = |suffix: &str| {
        pairs
            .iter()
            .find(|(key, value)| key.to_ascii_lowercase().ends_with(suffix) && !value.trim().is_empty())
            .map(|(_, value)| value.trim().to_string())
    };
    let coordinate = |tag: &str, ref_tag: &str| {
        let value = gps::parse_coordinate(&lookup(tag)?)?;
        let hemisphere = lookup(ref_tag)
            .and_then(|r| r.chars().next())
            .map(|c| c.to_ascii_uppercase());
        Some(gps::apply_hemisphere(value, hemisphere))
    };
    Embedded {
        capture_time: text_capture_time(pairs),
        make: lookup("make"),
        model: lookup("model"),
        latitude: coordinate("gpslatitude", "gpslatituderef"),
        longitude: coordinate("gpslongitude", "gpslongituderef"),
    }
}

fn text_capture_time(pairs: &[(String, String)]) -> Option<NaiveDateTime> {
    let preferred = DATE_KEYS.iter().find_map(|wanted| {
        pairs
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(wanted))
            .find_map(|(_, value)| parse_datetime(value))
    });
    preferred.or_else(|| {
        pairs
            .iter()
            .filter(|(key, _)| {
                let key = key.to_ascii_lowercase();
                key.contains("date") || key.contains("time")
            })
            .find_map(|(_, value)| parse_datetime(value))
    })
}

/// Fields from `primary` win; gaps are filled from `fallback`.
fn merge(primary: Embedded, fallback: Embedded) -> Embedded {
    Embedded {
        capture_time: primary.capture_time.or(fallback.capture_time),
        make: primary.make.or(fallback.make),
        model: primary.model.or(fallback.model),
        latitude: primary.latitude.or(fallback.latitude),
        longitude: primary.longitude.or(fallback.longitude),
    }
}
