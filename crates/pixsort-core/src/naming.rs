//! New filename stems built from the configured tag sequence.

use std::fmt;

use chrono::{Datelike, NaiveDateTime};
use unicode_normalization::UnicodeNormalization;

use crate::config::{FileNameTag, Labels, Separator};
use crate::layout::Subject;

/// Characters that are never allowed in a generated name.
pub const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RESERVED_DEVICE_NAMES: &[&str] = &["CON", "PRN", "AUX", "NUL"];

const MAX_NAME_CHARS: usize = 255;

/// Why a piece of custom filename text was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRule {
    ReservedCharacter(char),
    ReservedDeviceName,
    TrailingDotOrSpace,
    TooLong,
}

impl fmt::Display for NameRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameRule::ReservedCharacter(c) => write!(f, "contains reserved character {c:?}"),
            NameRule::ReservedDeviceName => f.write_str("is a reserved device name"),
            NameRule::TrailingDotOrSpace => f.write_str("ends with a period or space"),
            NameRule::TooLong => write!(f, "is longer than {MAX_NAME_CHARS} characters"),
        }
    }
}

/// Check literal text a user wants embedded in every generated name.
pub fn validate_custom_text(text: &str) -> Result<(), NameRule> {
    if let Some(c) = text.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(NameRule::ReservedCharacter(c));
    }
    if is_reserved_device_name(text) {
        return Err(NameRule::ReservedDeviceName);
    }
    if text.ends_with('.') || text.ends_with(' ') {
        return Err(NameRule::TrailingDotOrSpace);
    }
    if text.chars().count() > MAX_NAME_CHARS {
        return Err(NameRule::TooLong);
    }
    Ok(())
}

fn is_reserved_device_name(text: &str) -> bool {
    let upper = text.to_ascii_uppercase();
    if RESERVED_DEVICE_NAMES.contains(&upper.as_str()) {
        return true;
    }
    // COM1-9, LPT1-9
    match (upper.get(..3), upper.get(3..)) {
        (Some("COM" | "LPT"), Some(digit)) => {
            digit.len() == 1 && matches!(digit.as_bytes()[0], b'1'..=b'9')
        }
        _ => false,
    }
}

/// Replace every reserved character with `_`.
pub fn replace_reserved(name: &str) -> String {
    name.chars()
        .map(|c| if RESERVED_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .collect()
}

pub(crate) fn year(t: &NaiveDateTime) -> String {
    t.format("%Y").to_string()
}

pub(crate) fn month(t: &NaiveDateTime) -> String {
    t.format("%m").to_string()
}

pub(crate) fn day(t: &NaiveDateTime) -> String {
    t.format("%d").to_string()
}

pub(crate) fn weekday<'l>(t: &NaiveDateTime, labels: &'l Labels) -> &'l str {
    &labels.weekdays[t.weekday().num_days_from_monday() as usize]
}

pub struct NameBuilder<'a> {
    tags: &'a [FileNameTag],
    separator: Separator,
    labels: &'a Labels,
}

impl<'a> NameBuilder<'a> {
    pub fn new(tags: &'a [FileNameTag], separator: Separator, labels: &'a Labels) -> Self {
        Self {
            tags,
            separator,
            labels,
        }
    }

    /// Filename stem for one file. With no tags the original stem is kept.
    pub fn build(&self, subject: &Subject) -> String {
        let original = subject.original_stem();
        if self.tags.is_empty() {
            return original;
        }
        let parts: Vec<String> = self.tags.iter().map(|tag| self.render(tag, subject)).collect();
        let joined = replace_reserved(&parts.join(self.separator.as_str()));
        let stem: String = joined.nfc().collect();
        if stem.trim().is_empty() {
            original
        } else {
            stem
        }
    }

    fn render(&self, tag: &FileNameTag, subject: &Subject) -> String {
        let time = &subject.record.resolved_time;
        match tag {
            FileNameTag::Year => year(time),
            FileNameTag::Month => month(time),
            FileNameTag::Day => day(time),
            FileNameTag::Weekday => weekday(time, self.labels).to_string(),
            FileNameTag::Time => time.format("%H%M%S").to_string(),
            FileNameTag::Make => subject.make(self.labels).to_string(),
            FileNameTag::Model => subject.model(self.labels).to_string(),
            FileNameTag::Location => {
                let province = subject.place.province_name(self.labels);
                let city = subject.place.city_name(self.labels);
                if province == city {
                    province.to_string()
                } else {
                    format!("{}{}{}", province, self.separator.as_str(), city)
                }
            }
            FileNameTag::Original => subject.original_stem(),
            FileNameTag::Custom(text) => text.clone(),
        }
    }
}
