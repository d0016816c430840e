//! Recording file names.
//!
//! Files follow the pattern:
//!   `[<login>]<yymmdd_HHMMSS>_<title>.ts`
//! where the timestamp is the stream start converted to the host's local
//! timezone and the title has been stripped of path-hostile characters.

use chrono::{DateTime, TimeZone, Utc};

/// Timestamp layout embedded in file names.
pub const TIME_FORMAT: &str = "%y%m%d_%H%M%S";

/// Extension of the MPEG-TS container written by the capture tool.
pub const FILE_EXTENSION: &str = "ts";

/// Characters that never survive [`sanitize`].
pub const FORBIDDEN: &[char] = &['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>', '.', '\n'];

/// Remove every character in [`FORBIDDEN`] from `text`.
pub fn sanitize(text: &str) -> String {
    text.chars().filter(|c| !FORBIDDEN.contains(c)).collect()
}

/// Format a stream start time in `tz` using [`TIME_FORMAT`].
pub fn format_start_time<Tz>(started_at: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    started_at.with_timezone(tz).format(TIME_FORMAT).to_string()
}

/// Build the file name for a recording of `login` that started at
/// `started_at` with the given raw `title`.
pub fn recording_file_name<Tz>(login: &str, started_at: &DateTime<Utc>, title: &str, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "[{}]{}_{}.{}",
        login,
        format_start_time(started_at, tz),
        sanitize(title),
        FILE_EXTENSION
    )
}
