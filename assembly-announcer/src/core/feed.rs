/*!
Client for the municipal assembly feed
*/

use assembly_database::Event;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

use crate::core::config::SimpleSearchConfig;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed feed record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("Invalid start {value:?}: {reason}")]
    Start { value: String, reason: String },
}

/// Response body of the feed endpoint. Records stay untyped so that one
/// malformed entry does not discard the whole page.
#[derive(Debug, Deserialize)]
struct FeedPage {
    #[serde(default)]
    index: Vec<serde_json::Value>,
}

/// One event as listed by the feed
#[derive(Debug, Clone, Deserialize)]
pub struct FeedRecord {
    #[serde(deserialize_with = "number_or_string")]
    pub id: i64,
    #[serde(default, deserialize_with = "text")]
    pub lfdnr: String,
    /// `DD.MM.YYYY`
    #[serde(default, deserialize_with = "text")]
    pub datum: String,
    /// `HH:MM`
    #[serde(default, deserialize_with = "text")]
    pub von: String,
    #[serde(default, deserialize_with = "text")]
    pub bis: String,
    #[serde(default, deserialize_with = "text")]
    pub thema: String,
    #[serde(default, deserialize_with = "text")]
    pub plz: String,
    #[serde(default, deserialize_with = "text")]
    pub strasse_nr: String,
    #[serde(default, deserialize_with = "text")]
    pub aufzugsstrecke: String,
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(i64),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Number(n) => Ok(n),
        Id::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Strings that may also arrive as `null`
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl FeedRecord {
    pub fn parse(value: serde_json::Value) -> Result<Self, FeedError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Local start of the event
    pub fn start(&self, tz: Tz) -> Result<DateTime<Tz>, FeedError> {
        let value = format!("{} {}", self.datum, self.von);
        let naive = NaiveDateTime::parse_from_str(&value, "%d.%m.%Y %H:%M").map_err(|e| {
            FeedError::Start {
                value: value.clone(),
                reason: e.to_string(),
            }
        })?;

        tz.from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| FeedError::Start {
                value,
                reason: format!("does not exist in {}", tz),
            })
    }

    /// Convert to a storable event. Events starting in the past or beyond
    /// `now + horizon` are not of interest and yield `None`.
    pub fn to_event(&self, tz: Tz, now: DateTime<Utc>, horizon: Duration) -> Result<Option<Event>, FeedError> {
        let start = self.start(tz)?.with_timezone(&Utc);

        if start < now || start > now + horizon {
            debug!("Event {} at {} outside announcement window", self.id, start);
            return Ok(None);
        }

        Ok(Some(Event {
            id: self.id,
            serial: self.lfdnr.clone(),
            start,
            subject: self.thema.clone(),
            from: self.von.clone(),
            until: self.bis.clone(),
            postal_code: self.plz.clone(),
            street: self.strasse_nr.clone(),
            route: self.aufzugsstrecke.clone(),
        }))
    }
}

/// Feed URL listing the events of one day
pub fn feed_url(config: &SimpleSearchConfig, date: NaiveDate) -> String {
    format!("{}{}{}", config.base, config.feed, date.format("%d.%m.%Y"))
}

pub struct FeedClient {
    http: reqwest::Client,
    user_agent: String,
}

impl FeedClient {
    pub fn new(user_agent: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            user_agent: user_agent.to_string(),
        }
    }

    /// Raw records listed at `url`, see [`FeedRecord::parse`]
    pub async fn fetch(&self, url: &str) -> Result<Vec<serde_json::Value>, FeedError> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let page: FeedPage = response.json().await?;
        debug!("Feed {} listed {} events", url, page.index.len());
        Ok(page.index)
    }
}
