use chrono::{DateTime, Local, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use hookscope_types::{LogKind, LogRecord};

use crate::extract::extract_json;

/// Splits a raw line into an optional leading timestamp token and the
/// message. The token is recognized by its trailing zone marker (`UTC`,
/// `ISO`, or `GMT` with a signed numeric offset); one space between token
/// and message belongs to the separator.
static TIME_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A(.+(?:UTC|ISO|GMT[+-]\d+))? ?(.*)\z").expect("valid regex"));

/// Trailing zone marker, stripped before the second date-parse attempt
static ZONE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:UTC|ISO|GMT[+-]\d+)\s*\z").expect("valid regex"));

/// A raw line split into display parts, before record creation
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedLine {
    /// Local time-of-day label, or the raw token when unparseable
    pub time_label: Option<String>,

    /// Message text with the embedded payload excised
    pub display_text: String,

    /// Embedded structured payload, still unserialized so callers can
    /// inspect it before the record is built
    pub payload: Option<Value>,
}

impl ParsedLine {
    /// Build the immutable record, assigning the capture-time clock reading
    pub fn into_record(self, kind: LogKind) -> LogRecord {
        let payload = self
            .payload
            .as_ref()
            .map(|value| serde_json::to_string_pretty(value).unwrap_or_default());

        LogRecord {
            kind,
            timestamp: Utc::now().timestamp_millis(),
            message: self.display_text,
            time_label: self.time_label,
            payload,
            collapsed: true,
        }
    }
}

/// Log parser for extracting structure from raw debug stream lines
pub struct LogParser;

impl LogParser {
    /// Parse a raw debug stream line into its display parts.
    ///
    /// Returns `None` for an empty line. When the message embeds a balanced
    /// JSON literal, the literal is excised from the display text and kept
    /// as the payload.
    pub fn parse(raw: &str) -> Option<ParsedLine> {
        if raw.is_empty() {
            return None;
        }

        let (token, message) = Self::split_time_token(raw);
        let time_label = token.map(Self::time_label);

        let (display_text, payload) = match extract_json(message) {
            Some(found) => {
                let mut text = String::with_capacity(found.start + message.len() - found.end - 1);
                text.push_str(&message[..found.start]);
                text.push_str(&message[found.end + 1..]);
                (text, Some(found.value))
            }
            None => (message.to_string(), None),
        };

        Some(ParsedLine {
            time_label,
            display_text,
            payload,
        })
    }

    fn split_time_token(raw: &str) -> (Option<&str>, &str) {
        match TIME_TOKEN.captures(raw) {
            Some(caps) => {
                let token = caps.get(1).map(|m| m.as_str());
                let message = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                (token, message)
            }
            None => (None, raw),
        }
    }

    /// Render the matched token as a local time-of-day label when it parses
    /// as a calendar date; pass it through unmodified when it does not
    fn time_label(token: &str) -> String {
        match Self::parse_token_instant(token) {
            Some(instant) => instant
                .with_timezone(&Local)
                .format("%H:%M:%S")
                .to_string(),
            None => token.to_string(),
        }
    }

    /// Date-parse ladder over the raw token and the token with its zone
    /// marker stripped
    fn parse_token_instant(token: &str) -> Option<DateTime<Utc>> {
        let stripped = ZONE_MARKER.replace(token, "");
        let stripped = stripped.trim_end();

        for candidate in [token, stripped] {
            if let Ok(instant) = DateTime::parse_from_rfc3339(candidate) {
                return Some(instant.with_timezone(&Utc));
            }
            if let Ok(instant) = DateTime::parse_from_rfc2822(candidate) {
                return Some(instant.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(candidate, "%Y-%m-%d %H:%M:%S") {
                return Some(naive.and_utc());
            }
        }

        None
    }
}
