use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one calendar day in the site's local time,
/// formatted as `<Month>-<day>-<Year>` (e.g. `October-7-2026`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(String);

impl DayKey {
    /// Day-key of the local calendar day containing `now`
    pub fn for_instant(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        DayKey(now.with_timezone(&offset).format("%B-%-d-%Y").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DayKey {
    fn from(raw: &str) -> Self {
        DayKey(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_format_has_no_padding() {
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(DayKey::for_instant(now, utc()).as_str(), "March-7-2026");
    }

    #[test]
    fn test_stable_within_a_day() {
        let morning = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
        let night = Utc.with_ymd_and_hms(2026, 10, 17, 23, 59, 59).unwrap();
        assert_eq!(
            DayKey::for_instant(morning, utc()),
            DayKey::for_instant(night, utc())
        );
    }

    #[test]
    fn test_changes_at_local_midnight() {
        // UTC+02:00: 21:59 UTC is 23:59 local, 22:00 UTC is the next local day
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let before = Utc.with_ymd_and_hms(2026, 10, 17, 21, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 10, 17, 22, 0, 0).unwrap();

        assert_eq!(DayKey::for_instant(before, offset).as_str(), "October-17-2026");
        assert_eq!(DayKey::for_instant(after, offset).as_str(), "October-18-2026");
    }

    #[test]
    fn test_negative_offset() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let now = Utc.with_ymd_and_hms(2027, 1, 1, 3, 0, 0).unwrap();
        assert_eq!(DayKey::for_instant(now, offset).as_str(), "December-31-2026");
    }
}
