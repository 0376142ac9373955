//! External `exiftool` process for RAW, video, audio and anything the
//! built-in readers reject.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::gps;
use super::{Extraction, MetadataSource};
use crate::cancel::CancellationToken;
use crate::config::ExifToolOptions;
use crate::date::parse_datetime;
use crate::media::Embedded;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tag names as printed by `exiftool -s`, in capture-time priority order.
const DATE_TAGS: &[&str] = &[
    "DateTimeOriginal",
    "CreationDate",
    "CreateDate",
    "MediaCreateDate",
    "TrackCreateDate",
    "ModifyDate",
    "MediaModifyDate",
    "TrackModifyDate",
];

#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
    timeout: Duration,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Use the configured program, or look for `exiftool` on `PATH`.
    pub fn locate(options: &ExifToolOptions) -> Option<Self> {
        let program = match &options.program {
            Some(program) if program.is_file() => program.clone(),
            Some(program) => {
                tracing::warn!(program = %program.display(), "configured exiftool not found");
                return None;
            }
            None => which::which("exiftool").ok()?,
        };
        tracing::debug!(program = %program.display(), "using exiftool");
        Some(Self::new(program, options.timeout()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the tool on one file, polling so cancellation and the timeout
    /// can kill it.
    fn run(&self, path: &Path, cancel: &CancellationToken) -> Result<String, String> {
        let mut child = Command::new(&self.program)
            .args(["-s", "-n"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("cannot start {}: {e}", self.program.display()))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| "stdout not captured".to_string())?;
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf);
            buf
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    return Err(e.to_string());
                }
            }
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err("cancelled".to_string());
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("timed out after {}s", self.timeout.as_secs_f32()));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = reader
            .join()
            .map_err(|_| "output reader panicked".to_string())?;
        if !status.success() {
            return Err(format!("exited with {status}"));
        }
        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}

impl MetadataSource for ExifTool {
    fn name(&self) -> &'static str {
        "exiftool"
    }

    fn extract(&self, path: &Path, cancel: &CancellationToken) -> Extraction {
        match self.run(path, cancel) {
            Ok(output) => {
                let embedded = embedded_from_tags(&parse_output(&output));
                if embedded.is_empty() {
                    Extraction::Empty
                } else {
                    Extraction::Found(embedded)
                }
            }
            Err(reason) => Extraction::Failed(reason),
        }
    }
}

/// `Tag : value` lines into a map. The first occurrence of a tag wins.
pub fn parse_output(output: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim();
            if !value.is_empty() {
                tags.entry(key.trim().to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
    }
    tags
}

pub fn embedded_from_tags(tags: &HashMap<String, String>) -> Embedded {
    let capture_time = DATE_TAGS
        .iter()
        .filter_map(|tag| tags.get(*tag))
        .find_map(|value| parse_datetime(value));

    let coordinate = |tag: &str, ref_tag: &str| {
        let value = gps::parse_coordinate(tags.get(tag)?)?;
        let hemisphere = tags
            .get(ref_tag)
            .and_then(|r| r.chars().next())
            .map(|c| c.to_ascii_uppercase());
        Some(gps::apply_hemisphere(value, hemisphere))
    };
    let (latitude, longitude) = match (
        coordinate("GPSLatitude", "GPSLatitudeRef"),
        coordinate("GPSLongitude", "GPSLongitudeRef"),
    ) {
        (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
        _ => ["GPSPosition", "GPSCoordinates"]
            .iter()
            .filter_map(|tag| tags.get(*tag))
            .find_map(|value| gps::parse_position(value))
            .map_or((None, None), |(lat, lon)| (Some(lat), Some(lon))),
    };

    Embedded {
        capture_time,
        make: tags.get("Make").cloned(),
        model: tags.get("Model").cloned(),
        latitude,
        longitude,
    }
}
