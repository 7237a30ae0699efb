//! Snapshot naming and recognition.
//!
//! Names look like `<dataset>@zfs-apt-snap_<UTC timestamp>`. The prefix is
//! how later runs find their own snapshots among everything else on the
//! pool; the timestamp drives age-based pruning.
//!
//! Earlier releases wrote coarser timestamps (`%Y-%m-%d-%H%M`) and some
//! tooling writes a `T` between date and time, so parsing walks an explicit
//! ordered list of formats. A name that carries the prefix but matches none
//! of them is an error, never a silent skip.

use chrono::format::{parse, Parsed, StrftimeItems};
use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// Constant token marking snapshots created by this tool.
pub const SNAPSHOT_PREFIX: &str = "zfs-apt-snap";

/// Between the prefix and the timestamp.
pub const PREFIX_SEPARATOR: char = '_';

/// Format used for new snapshots.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Finest field a format carries; coarser formats get the rest filled with
/// their minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

struct TimestampFormat {
    pattern: &'static str,
    precision: Precision,
}

/// Tried in order. Canonical first, then right-truncated at each directive
/// boundary, then the `T`-separated variants.
const TIMESTAMP_FORMATS: &[TimestampFormat] = &[
    TimestampFormat { pattern: TIMESTAMP_FORMAT, precision: Precision::Second },
    TimestampFormat { pattern: "%Y-%m-%d-%H%M", precision: Precision::Minute },
    TimestampFormat { pattern: "%Y-%m-%d-%H", precision: Precision::Hour },
    TimestampFormat { pattern: "%Y-%m-%d", precision: Precision::Day },
    TimestampFormat { pattern: "%Y-%m", precision: Precision::Month },
    TimestampFormat { pattern: "%Y", precision: Precision::Year },
    TimestampFormat { pattern: "%Y-%m-%dT%H%M%S", precision: Precision::Second },
    TimestampFormat { pattern: "%Y-%m-%dT%H%M", precision: Precision::Minute },
    TimestampFormat { pattern: "%Y-%m-%dT%H", precision: Precision::Hour },
];

impl Precision {
    /// Set every field finer than `self` to its minimum.
    fn fill(self, parsed: &mut Parsed) -> chrono::ParseResult<()> {
        if self < Precision::Month {
            parsed.set_month(1)?;
        }
        if self < Precision::Day {
            parsed.set_day(1)?;
        }
        if self < Precision::Hour {
            parsed.set_hour(0)?;
        }
        if self < Precision::Minute {
            parsed.set_minute(0)?;
        }
        if self < Precision::Second {
            parsed.set_second(0)?;
        }
        Ok(())
    }
}

fn parse_with(text: &str, fmt: &TimestampFormat) -> Option<NaiveDateTime> {
    let mut parsed = Parsed::new();
    parse(&mut parsed, text, StrftimeItems::new(fmt.pattern)).ok()?;
    fmt.precision.fill(&mut parsed).ok()?;
    parsed.to_naive_datetime_with_offset(0).ok()
}

/// Timestamp text in the canonical format.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Snapshot part of the name: `zfs-apt-snap_<timestamp>`.
pub fn snapshot_label(ts: DateTime<Utc>) -> String {
    format!("{}{}{}", SNAPSHOT_PREFIX, PREFIX_SEPARATOR, format_timestamp(ts))
}

/// `<volume>@zfs-apt-snap_<timestamp>`.
pub fn name_for(volume: &str, ts: DateTime<Utc>) -> String {
    format!("{}@{}", volume, snapshot_label(ts))
}

/// True iff the part after `@` starts with the prefix token.
pub fn is_own_snapshot(full_name: &str) -> bool {
    full_name
        .split_once('@')
        .map_or(false, |(_, snap)| snap.starts_with(SNAPSHOT_PREFIX))
}

/// Parse a bare timestamp against the format family.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| parse_with(text, fmt))
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Creation time embedded in one of our snapshot names.
pub fn parse_age(full_name: &str) -> Result<DateTime<Utc>> {
    let bad = |timestamp: &str| Error::TimestampParse {
        name: full_name.to_string(),
        timestamp: timestamp.to_string(),
    };
    let snap = match full_name.split_once('@') {
        Some((_, snap)) => snap,
        None => return Err(bad("")),
    };
    let rest = snap.strip_prefix(SNAPSHOT_PREFIX).ok_or_else(|| bad(snap))?;
    let text = rest.strip_prefix(PREFIX_SEPARATOR).ok_or_else(|| bad(rest))?;
    parse_timestamp(text).ok_or_else(|| bad(text))
}

/// Older than `now - retention`. A snapshot exactly at the boundary is kept.
pub fn is_stale(created: DateTime<Utc>, now: DateTime<Utc>, retention: Duration) -> bool {
    created < now - retention
}

/// `ts` at the precision new names carry.
pub fn truncate_to_format(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// One of our snapshots found on the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnSnapshot {
    pub name: String,
    pub volume: String,
    pub created: DateTime<Utc>,
}

impl OwnSnapshot {
    /// None for names without our prefix; Err for ours with a bad timestamp.
    pub fn recognise(full_name: &str) -> Result<Option<Self>> {
        if !is_own_snapshot(full_name) {
            return Ok(None);
        }
        let created = parse_age(full_name)?;
        let volume = full_name
            .split_once('@')
            .map(|(v, _)| v.to_string())
            .unwrap_or_default();
        Ok(Some(Self {
            name: full_name.to_string(),
            volume,
            created,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn canonical_name_shape() {
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        assert_eq!(name_for("tank/usr", t), "tank/usr@zfs-apt-snap_2024-03-09-070502");
    }

    #[test]
    fn every_format_in_the_family_parses() {
        let cases = [
            ("2024-03-09-070502", (2024, 3, 9, 7, 5, 2)),
            ("2024-03-09-0705", (2024, 3, 9, 7, 5, 0)),
            ("2024-03-09-07", (2024, 3, 9, 7, 0, 0)),
            ("2024-03-09", (2024, 3, 9, 0, 0, 0)),
            ("2024-03", (2024, 3, 1, 0, 0, 0)),
            ("2024", (2024, 1, 1, 0, 0, 0)),
            ("2024-03-09T070502", (2024, 3, 9, 7, 5, 2)),
            ("2024-03-09T0705", (2024, 3, 9, 7, 5, 0)),
            ("2024-03-09T07", (2024, 3, 9, 7, 0, 0)),
        ];
        for (text, (y, mo, d, h, mi, s)) in cases {
            let want = Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap();
            assert_eq!(parse_timestamp(text), Some(want), "format of {text}");
        }
    }

    #[test]
    fn junk_does_not_parse() {
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-01"), None);
        assert_eq!(parse_timestamp("2024-03-09-0705021"), None);
        assert_eq!(parse_timestamp(""), None);
    }
}
