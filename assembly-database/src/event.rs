/*!
The persisted assembly event and its derived hashes
*/

use chrono::{DateTime, SecondsFormat, Utc};

/// A single public assembly as listed by the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Numeric id assigned by the source system
    pub id: i64,
    /// Serial number (`lfdnr`)
    pub serial: String,
    pub start: DateTime<Utc>,
    /// Subject (`thema`)
    pub subject: String,
    /// Start of the announced time range, `HH:MM`
    pub from: String,
    /// End of the announced time range, `HH:MM`
    pub until: String,
    pub postal_code: String,
    /// Street and house number (`strasse_nr`)
    pub street: String,
    /// Route of a procession (`aufzugsstrecke`)
    pub route: String,
}

impl Event {
    /// Primary key: identifies one posting of an event at one start time.
    pub fn key(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(format_timestamp(&self.start).as_bytes());
        hasher.update(self.subject.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Content checksum used to spot the same event reposted under a
    /// different start time or id.
    pub fn checksum(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for field in [&self.subject, &self.route, &self.postal_code, &self.street] {
            hasher.update(strip_non_alphanumeric(field).as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Keep ASCII letters and digits only
pub fn strip_non_alphanumeric(text: &str) -> String {
    text.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// UTC RFC 3339 with second precision, e.g. `2024-05-01T10:00:00Z`.
///
/// Every stored timestamp uses this form so string comparison in SQL
/// orders chronologically.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
