//! Coordinate parsing shared by all metadata sources.
//!
//! Accepts decimal degrees (`31.2304`), degree/minute/second text
//! (`31 deg 13' 49.44" N`, `31,13.824N`) and combined `"lat, lon"` strings.

use regex::Regex;
use std::sync::LazyLock;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap());

/// Decimal degrees from degree/minute/second components.
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    let sign = if degrees.is_sign_negative() { -1.0 } else { 1.0 };
    sign * (degrees.abs() + minutes / 60.0 + seconds / 3600.0)
}

/// Parse one coordinate. A hemisphere letter inside the text (N/S/E/W)
/// sets the sign, as does a leading minus.
pub fn parse_coordinate(text: &str) -> Option<f64> {
    let numbers: Vec<f64> = NUMBER_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    let value = match numbers.as_slice() {
        [d] => *d,
        [d, m] => dms_to_decimal(*d, *m, 0.0),
        [d, m, s, ..] => dms_to_decimal(*d, *m, *s),
        [] => return None,
    };
    Some(apply_hemisphere(value, hemisphere_in(text)))
}

/// Parse a combined position such as `"31.23, 121.47"` or `"31.23 121.47 12.5"`.
pub fn parse_position(text: &str) -> Option<(f64, f64)> {
    let parts: Vec<&str> = if text.contains(',') {
        text.split(',').map(str::trim).collect()
    } else {
        text.split_whitespace().collect()
    };
    if parts.len() < 2 {
        return None;
    }
    Some((parse_coordinate(parts[0])?, parse_coordinate(parts[1])?))
}

/// Sign a coordinate using its reference tag (`S`/`W` negative).
pub fn apply_hemisphere(value: f64, hemisphere: Option<char>) -> f64 {
    match hemisphere {
        Some('S') | Some('W') => -value.abs(),
        Some('N') | Some('E') => value.abs(),
        _ => value,
    }
}

/// First hemisphere letter standing on its own or right after a digit.
pub fn hemisphere_in(text: &str) -> Option<char> {
    let chars: Vec<char> = text.chars().collect();
    chars.iter().enumerate().find_map(|(i, c)| {
        let upper = c.to_ascii_uppercase();
        if !matches!(upper, 'N' | 'S' | 'E' | 'W') {
            return None;
        }
        let before_ok = i == 0 || !chars[i - 1].is_alphabetic();
        let after_ok = i + 1 == chars.len() || !chars[i + 1].is_alphabetic();
        (before_ok && after_ok).then_some(upper)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_decimal() {
        assert!(close(parse_coordinate("31.2304").unwrap(), 31.2304));
        assert!(close(parse_coordinate("-33.8688").unwrap(), -33.8688));
    }

    #[test]
    fn test_dms_with_hemisphere() {
        let lat = parse_coordinate("31 deg 13' 49.44\" N").unwrap();
        assert!(close(lat, 31.0 + 13.0 / 60.0 + 49.44 / 3600.0));
        let lon = parse_coordinate("121 deg 28' 12.00\" W").unwrap();
        assert!(close(lon, -(121.0 + 28.0 / 60.0 + 12.0 / 3600.0)));
        // XMP style: degrees, decimal minutes, trailing reference
        assert!(close(parse_coordinate("31,13.824S").unwrap(), -(31.0 + 13.824 / 60.0)));
    }

    #[test]
    fn test_reference_tag_overrides_sign() {
        assert!(close(apply_hemisphere(33.5, Some('S')), -33.5));
        assert!(close(apply_hemisphere(-33.5, Some('N')), 33.5));
        assert!(close(apply_hemisphere(-33.5, None), -33.5));
    }

    #[test]
    fn test_combined_position() {
        let (lat, lon) = parse_position("31.2304, 121.4737").unwrap();
        assert!(close(lat, 31.2304) && close(lon, 121.4737));
        let (lat, lon) = parse_position("-12.5 130.8 4.2").unwrap();
        assert!(close(lat, -12.5) && close(lon, 130.8));
        assert!(parse_position("31.2304").is_none());
    }

    #[test]
    fn test_hemisphere_detection_ignores_words() {
        assert_eq!(hemisphere_in("31 deg N"), Some('N'));
        assert_eq!(hemisphere_in("12.5W"), Some('W'));
        assert_eq!(hemisphere_in("31 deg"), None);
        assert_eq!(parse_coordinate("North"), None);
    }
}
