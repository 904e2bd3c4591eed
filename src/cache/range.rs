//! Single-range `Range` header handling for cached bodies.

use std::ops::RangeInclusive;

/// One `bytes=` range. Multi-range requests are not represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=a-b`
    FromTo(u64, u64),
    /// `bytes=a-`
    From(u64),
    /// `bytes=-n`
    Suffix(u64),
}

/// A range resolved against a body length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedRange {
    Satisfiable(RangeInclusive<u64>),
    Unsatisfiable,
}

impl RangeSpec {
    /// Parse a header value. `None` for anything other than a single byte range.
    pub fn parse(header: &str) -> Option<Self> {
        let spec = header.trim().strip_prefix("bytes=")?.trim();
        if spec.contains(',') {
            return None;
        }
        let (start, end) = spec.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());

        match (start.is_empty(), end.is_empty()) {
            (true, true) => None,
            (true, false) => end.parse().ok().map(RangeSpec::Suffix),
            (false, true) => start.parse().ok().map(RangeSpec::From),
            (false, false) => {
                let (a, b) = (start.parse().ok()?, end.parse().ok()?);
                (a <= b).then_some(RangeSpec::FromTo(a, b))
            }
        }
    }

    pub fn resolve(&self, len: u64) -> ResolvedRange {
        let range = match *self {
            RangeSpec::FromTo(a, b) if a < len => Some(a..=b.min(len - 1)),
            RangeSpec::From(a) if a < len => Some(a..=len - 1),
            RangeSpec::Suffix(n) if n > 0 && len > 0 => Some(len.saturating_sub(n)..=len - 1),
            _ => None,
        };
        match range {
            Some(r) => ResolvedRange::Satisfiable(r),
            None => ResolvedRange::Unsatisfiable,
        }
    }
}

/// `Content-Range` value for a satisfied range.
pub fn content_range(range: &RangeInclusive<u64>, total: u64) -> String {
    format!("bytes {}-{}/{}", range.start(), range.end(), total)
}

/// `Content-Range` value for a 416.
pub fn unsatisfied_range(total: u64) -> String {
    format!("bytes */{total}")
}
