use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::naming;

/// One input folder of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSpec {
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub include_subfolders: bool,
}

impl FolderSpec {
    pub fn new(path: impl Into<PathBuf>, include_subfolders: bool) -> Self {
        Self {
            path: path.into(),
            include_subfolders,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One level of the destination directory structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ClassLevel {
    /// Stops the structure; later levels are ignored.
    None,
    Year,
    Month,
    Day,
    Weekday,
    DeviceMake,
    DeviceModel,
    Province,
    City,
    FileType,
    Extension,
}

/// Which timestamp becomes a file's authoritative date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TimePolicy {
    #[default]
    Capture,
    Create,
    Modify,
    Earliest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransferMode {
    #[default]
    Copy,
    Move,
}

/// Joiner placed between rendered filename tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Separator {
    #[default]
    Hyphen,
    None,
    Space,
    Underscore,
    Period,
    Comma,
    Tilde,
}

impl Separator {
    pub fn as_str(self) -> &'static str {
        match self {
            Separator::Hyphen => "-",
            Separator::None => "",
            Separator::Space => " ",
            Separator::Underscore => "_",
            Separator::Period => ".",
            Separator::Comma => ",",
            Separator::Tilde => "~",
        }
    }
}

/// One element of the generated filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileNameTag {
    Year,
    Month,
    Day,
    Weekday,
    Time,
    Make,
    Model,
    Location,
    #[serde(alias = "original-name")]
    Original,
    /// Literal text, rendered verbatim.
    Custom(String),
}

impl FromStr for FileNameTag {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(text) = s.strip_prefix("custom:") {
            return Ok(FileNameTag::Custom(text.to_string()));
        }
        match s.to_ascii_lowercase().as_str() {
            "year" => Ok(FileNameTag::Year),
            "month" => Ok(FileNameTag::Month),
            "day" => Ok(FileNameTag::Day),
            "weekday" => Ok(FileNameTag::Weekday),
            "time" => Ok(FileNameTag::Time),
            "make" => Ok(FileNameTag::Make),
            "model" => Ok(FileNameTag::Model),
            "location" => Ok(FileNameTag::Location),
            "original" | "original-name" => Ok(FileNameTag::Original),
            _ => Err(ConfigError::UnknownTag(s.to_string())),
        }
    }
}

impl fmt::Display for FileNameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileNameTag::Year => f.write_str("year"),
            FileNameTag::Month => f.write_str("month"),
            FileNameTag::Day => f.write_str("day"),
            FileNameTag::Weekday => f.write_str("weekday"),
            FileNameTag::Time => f.write_str("time"),
            FileNameTag::Make => f.write_str("make"),
            FileNameTag::Model => f.write_str("model"),
            FileNameTag::Location => f.write_str("location"),
            FileNameTag::Original => f.write_str("original"),
            FileNameTag::Custom(text) => write!(f, "custom:{}", text),
        }
    }
}

/// User-visible sentinels and bucket names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Labels {
    pub unknown_device: String,
    pub unknown_province: String,
    pub unknown_city: String,
    /// Monday first.
    pub weekdays: [String; 7],
    pub image: String,
    pub video: String,
    pub audio: String,
    pub other: String,
    /// Directory that receives flat extraction when nothing else is configured.
    pub flat_bucket: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            unknown_device: "Unknown Device".into(),
            unknown_province: "Unknown Province".into(),
            unknown_city: "Unknown City".into(),
            weekdays: [
                "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
            ]
            .map(String::from),
            image: "image".into(),
            video: "video".into(),
            audio: "audio".into(),
            other: "other".into(),
            flat_bucket: "Organized".into(),
        }
    }
}

impl Labels {
    /// Simplified-Chinese labels.
    pub fn zh_cn() -> Self {
        Self {
            unknown_device: "未知设备".into(),
            unknown_province: "未知省份".into(),
            unknown_city: "未知城市".into(),
            weekdays: ["星期一", "星期二", "星期三", "星期四", "星期五", "星期六", "星期日"]
                .map(String::from),
            image: "图片".into(),
            video: "视频".into(),
            audio: "音频".into(),
            other: "其他".into(),
            flat_bucket: "整理结果".into(),
        }
    }
}

/// Boundary datasets and the cross-run geocode cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoOptions {
    pub provinces: Option<PathBuf>,
    pub cities: Option<PathBuf>,
    pub cache_file: Option<PathBuf>,
}

const DEFAULT_EXIFTOOL_TIMEOUT_SECS: u64 = 30;

fn default_exiftool_timeout() -> u64 {
    DEFAULT_EXIFTOOL_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExifToolOptions {
    /// Explicit binary; searched on PATH when unset.
    #[serde(default)]
    pub program: Option<PathBuf>,
    #[serde(default = "default_exiftool_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExifToolOptions {
    fn default() -> Self {
        Self {
            program: None,
            timeout_secs: DEFAULT_EXIFTOOL_TIMEOUT_SECS,
        }
    }
}

impl ExifToolOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Everything a run needs to know, as collected by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizeOptions {
    pub folders: Vec<FolderSpec>,
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default)]
    pub mode: TransferMode,
    #[serde(default)]
    pub time_policy: TimePolicy,
    #[serde(default)]
    pub levels: Vec<ClassLevel>,
    #[serde(default)]
    pub name_tags: Vec<FileNameTag>,
    #[serde(default)]
    pub separator: Separator,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub geo: GeoOptions,
    #[serde(default)]
    pub exiftool: ExifToolOptions,
}

impl OrganizeOptions {
    /// Configuration-time checks; a failing config never starts a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.folders.is_empty() {
            return Err(ConfigError::NoFolders);
        }
        for tag in &self.name_tags {
            if let FileNameTag::Custom(text) = tag {
                naming::validate_custom_text(text).map_err(|rule| ConfigError::InvalidCustomText {
                    text: text.clone(),
                    rule,
                })?;
            }
        }
        Ok(())
    }

    /// Levels up to (not including) the first `None`.
    pub fn effective_levels(&self) -> &[ClassLevel] {
        let end = self
            .levels
            .iter()
            .position(|level| *level == ClassLevel::None)
            .unwrap_or(self.levels.len());
        &self.levels[..end]
    }

    /// No destination, no structure, no renaming: files are gathered flat.
    pub fn is_flat_extraction(&self) -> bool {
        self.destination.is_none() && self.effective_levels().is_empty() && self.name_tags.is_empty()
    }

    pub fn uses_geography(&self) -> bool {
        self.effective_levels()
            .iter()
            .any(|level| matches!(level, ClassLevel::Province | ClassLevel::City))
            || self.name_tags.contains(&FileNameTag::Location)
    }
}
