//! Wall-clock conversions between listing timestamps and file times
//!
//! Listing timestamps carry no zone. They are read as local time on the
//! mirroring host, which is also how local mtimes are compared against them.

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use filetime::FileTime;
use std::time::SystemTime;

pub const LISTING_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse the `<date> <time>` pair of a listing line
pub fn parse_listing(date: &str, time: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(&format!("{} {}", date, time), LISTING_FORMAT)
}

/// Local-zone wall clock for a filesystem time
pub fn to_naive_local(t: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(t).naive_local()
}

/// Filesystem time for a local-zone wall clock. Ambiguous instants (DST fold)
/// take the earlier reading. A reading inside a DST gap moves to the first
/// instant after the gap, so the stamped file never reads older than `naive`.
pub fn to_file_time(naive: NaiveDateTime) -> FileTime {
    let when = instant_at(&Local, naive);
    FileTime::from_unix_time(when.timestamp(), when.timestamp_subsec_nanos())
}

fn instant_at<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(t) = tz.from_local_datetime(&naive).earliest() {
        return t.with_timezone(&Utc);
    }
    // gaps are at most a few hours; walk forward a minute at a time
    let mut later = naive;
    for _ in 0..(24 * 60) {
        later += Duration::minutes(1);
        if let Some(t) = tz.from_local_datetime(&later).earliest() {
            let t = t.with_timezone(&Utc);
            // first instant after the gap, on a whole minute boundary
            let back = Duration::seconds(i64::from(later.second()))
                + Duration::nanoseconds(i64::from(later.nanosecond()));
            return t - back;
        }
    }
    Utc.from_utc_datetime(&naive)
}
