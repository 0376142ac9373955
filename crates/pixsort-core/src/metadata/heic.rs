use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use exif::Reader;

use super::exif::{classify_error, from_exif};
use super::{Extraction, MetadataSource};
use crate::cancel::CancellationToken;

const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"mif1", b"msf1", b"heim", b"heis", b"avif",
];

/// HEIF/HEIC container reader. The brand check keeps a mislabelled
/// JPEG or MOV from being parsed as ISO-BMFF.
pub struct HeicReader;

impl MetadataSource for HeicReader {
    fn name(&self) -> &'static str {
        "heic"
    }

    fn extract(&self, path: &Path, _cancel: &CancellationToken) -> Extraction {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) => return Extraction::Failed(e.to_string()),
        };
        let mut header = [0u8; 32];
        let read = match file.read(&mut header) {
            Ok(n) => n,
            Err(e) => return Extraction::Failed(e.to_string()),
        };
        if !is_heif(&header[..read]) {
            return Extraction::NotApplicable;
        }

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

/// `ftyp` box with a HEIF major or compatible brand.
fn is_heif(header: &[u8]) -> bool {
    if header.len() < 12 || &header[4..8] != b"ftyp" {
        return false;
    }
    let box_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let end = box_len.clamp(12, header.len());
    let major = &header[8..12];
    let compatible = header.get(16..end).unwrap_or(&[]);
    std::iter::once(major)
        .chain(compatible.chunks_exact(4))
        .any(|brand| HEIF_BRANDS.iter().any(|b| b.as_slice() == brand))
}
