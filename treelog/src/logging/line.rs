//! Log line format: `<short-date short-time> [<tag>]:<message>\r\n`

use chrono::{DateTime, Local, TimeZone};

/// US short date and short time, e.g. `3/7/24, 9:05 PM`
pub const TIMESTAMP_FORMAT: &str = "%-m/%-d/%y, %-I:%M %p";

/// Format used to read a timestamp back
pub const TIMESTAMP_PARSE_FORMAT: &str = "%m/%d/%y, %I:%M %p";

pub const LINE_TERMINATOR: &str = "\r\n";

pub fn timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn format_line(timestamp: &str, tag: &str, message: &str) -> String {
    format!("{} [{}]:{}{}", timestamp, tag, message, LINE_TERMINATOR)
}

/// Build a line stamped with the current local time
pub fn format_line_now(tag: &str, message: &str) -> String {
    format_line(&timestamp(&Local::now()), tag, message)
}

/// Append an error and its source chain to a message. A cause whose text is
/// already part of the error above it is not repeated.
pub fn with_error(message: &str, error: &(dyn std::error::Error + 'static)) -> String {
    let mut previous = error.to_string();
    let mut text = format!("{}{}{}", message, LINE_TERMINATOR, previous);
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !previous.contains(&cause_text) {
            text.push_str(LINE_TERMINATOR);
            text.push_str("Caused by: ");
            text.push_str(&cause_text);
        }
        previous = cause_text;
        source = cause.source();
    }
    text
}
