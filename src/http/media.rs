//! Media types and `Accept` negotiation.

use std::fmt;

/// A `type/subtype` pair, compared case-insensitively. Parameters are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    kind: String,
    subtype: String,
}

impl MediaType {
    /// Parses `text/html; charset=utf-8` into `text/html`.
    pub fn parse(src: &str) -> Option<Self> {
        let essence = src.split(';').next()?.trim();
        let (kind, subtype) = essence.split_once('/')?;
        let (kind, subtype) = (kind.trim(), subtype.trim());

        if kind.is_empty() || subtype.is_empty() || kind.contains(' ') || subtype.contains(' ') {
            return None;
        }

        Some(Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
        })
    }

    /// Primary type (`text`).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Subtype (`html`).
    pub fn subtype(&self) -> &str {
        &self.subtype
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)
    }
}

/// One element of an `Accept` header, e.g. `text/*;q=0.5`.
///
/// Quality is kept in thousandths (`q=0.5` is `500`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRange {
    range: MediaType,
    quality: u16,
}

impl MediaRange {
    /// The `*/*` range with full quality.
    pub fn any() -> Self {
        Self {
            range: MediaType {
                kind: "*".into(),
                subtype: "*".into(),
            },
            quality: 1000,
        }
    }

    /// Parses one range; an unparsable `q` falls back to `1`.
    pub fn parse(src: &str) -> Option<Self> {
        let range = MediaType::parse(src)?;
        if range.kind == "*" && range.subtype != "*" {
            return None;
        }

        let quality = src
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
            .and_then(|(_, value)| parse_quality(value.trim()))
            .unwrap_or(1000);

        Some(Self { range, quality })
    }

    /// Parses a whole `Accept` header; an absent header means `*/*`.
    pub fn parse_accept(header: Option<&str>) -> Vec<Self> {
        match header {
            None => vec![Self::any()],
            Some(value) => value.split(',').filter_map(Self::parse).collect(),
        }
    }

    /// Quality in thousandths.
    pub fn quality(&self) -> u16 {
        self.quality
    }

    /// Checks whether this range covers `media`.
    pub fn matches(&self, media: &MediaType) -> bool {
        match (self.range.kind.as_str(), self.range.subtype.as_str()) {
            ("*", _) => true,
            (kind, "*") => kind == media.kind,
            (kind, subtype) => kind == media.kind && subtype == media.subtype,
        }
    }

    // */* < type/* < type/subtype
    fn specificity(&self) -> u8 {
        match (self.range.kind.as_str(), self.range.subtype.as_str()) {
            ("*", _) => 0,
            (_, "*") => 1,
            _ => 2,
        }
    }
}

/// Quality the client assigns to `media`: the `q` of the most specific
/// matching range, `0` when nothing matches.
pub fn quality_of(ranges: &[MediaRange], media: &MediaType) -> u16 {
    ranges
        .iter()
        .filter(|range| range.matches(media))
        .max_by_key(|range| range.specificity())
        .map(MediaRange::quality)
        .unwrap_or(0)
}

// "0.8" -> 800, "1" -> 1000, "1.000" -> 1000
fn parse_quality(value: &str) -> Option<u16> {
    let (int, frac) = value.split_once('.').unwrap_or((value, ""));
    if frac.len() > 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut thousandths = 0u16;
    for (i, digit) in frac.bytes().enumerate() {
        thousandths += (digit - b'0') as u16 * [100, 10, 1][i];
    }

    match int {
        "0" => Some(thousandths),
        "1" if thousandths == 0 => Some(1000),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(src: &str) -> MediaType {
        MediaType::parse(src).unwrap()
    }

    #[test]
    fn media_types() {
        assert_eq!(media("Text/HTML; charset=utf-8").to_string(), "text/html");
        assert_eq!(media("application/json").subtype(), "json");
        assert_eq!(MediaType::parse("text"), None);
        assert_eq!(MediaType::parse("/html"), None);
        assert_eq!(MediaType::parse(""), None);
    }

    #[test]
    fn qualities() {
        #[rustfmt::skip]
        let cases = [
            ("0",     Some(0)),
            ("0.5",   Some(500)),
            ("0.25",  Some(250)),
            ("0.001", Some(1)),
            ("1",     Some(1000)),
            ("1.000", Some(1000)),
            ("1.5",   None),
            ("2",     None),
            ("0.1234", None),
            ("x",     None),
        ];

        for (value, expected) in cases {
            assert_eq!(parse_quality(value), expected, "{value}");
        }
    }

    #[test]
    fn negotiation() {
        let ranges =
            MediaRange::parse_accept(Some("text/*;q=0.3, text/html;q=0.7, */*;q=0.5, image/png;q=0"));

        assert_eq!(quality_of(&ranges, &media("text/html")), 700);
        assert_eq!(quality_of(&ranges, &media("text/plain")), 300);
        assert_eq!(quality_of(&ranges, &media("application/json")), 500);
        assert_eq!(quality_of(&ranges, &media("image/png")), 0);
    }

    #[test]
    fn absent_header_accepts_everything() {
        let ranges = MediaRange::parse_accept(None);
        assert_eq!(quality_of(&ranges, &media("application/xml")), 1000);

        let ranges = MediaRange::parse_accept(Some("text/html"));
        assert_eq!(quality_of(&ranges, &media("application/xml")), 0);
    }

    #[test]
    fn invalid_ranges_are_skipped() {
        let ranges = MediaRange::parse_accept(Some("*/html, nonsense, text/plain"));
        assert_eq!(ranges.len(), 1);
        assert!(ranges[0].matches(&media("text/plain")));
    }
}
