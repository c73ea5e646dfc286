/*!
Configuration management for the announcer
*/

use std::path::{Path, PathBuf};
use std::str::FromStr;

use assembly_database::StoreOptions;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User agent sent to the feed and the Mastodon server unless configured
pub const DEFAULT_USER_AGENT: &str = "fediSimpleSearch/0.01 (2023-12-30)";

/// Words turned into hashtags when they appear in an announcement
pub const DEFAULT_TAGS: &[&str] = &[
    "Demonstration",
    "Mahnwache",
    "Versammlung",
    "Berlin",
    "Polizei",
    "Friedrichshain",
    "Kreuzberg",
    "Pankow",
    "Charlottenburg",
    "Wilmersdorf",
    "Spandau",
    "Steglitz",
    "Zehlendorf",
    "Tempelhof",
    "Schöneberg",
    "Neukölln",
    "Treptow",
    "Köpenick",
    "Marzahn",
    "Hellersdorf",
    "Lichtenberg",
    "Reinickendorf",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Failed to resolve directory {path:?}: {source}")]
    Dir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unknown time zone: {0}")]
    TimeZone(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Base directory for relative database paths
    pub dir: PathBuf,
    /// Time zone the feed's dates and times are given in
    pub timezone: String,
    /// Hashtag vocabulary
    pub tags: Vec<String>,
    pub mastodon: MastodonConfig,
    pub db: DbConfig,
    pub simple_search: SimpleSearchConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MastodonConfig {
    /// e.g. https://botsin.space
    pub server: String,
    pub client_id: String,
    pub client_secret: String,
    /// Application name used when registering
    pub client_name: String,
    /// e.g. `read write follow`
    pub scopes: String,
    pub website: String,
    pub redirect_uri: String,
    /// Access token of the posting account
    pub token: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DbConfig {
    /// Path of the SQLite file
    pub dsn: PathBuf,
    /// `PRAGMA journal_mode`; empty leaves the SQLite default
    pub journal_mode: String,
    pub retention_days: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimpleSearchConfig {
    /// Heading placed above the link in every announcement
    pub title: String,
    /// Base URL of the feed site
    #[serde(rename = "url")]
    pub base: String,
    /// Feed path, the date (`DD.MM.YYYY`) is appended
    pub feed: String,
    /// Detail page path, the event id is appended
    pub detail: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            timezone: "Europe/Berlin".to_string(),
            tags: DEFAULT_TAGS.iter().map(|t| t.to_string()).collect(),
            mastodon: MastodonConfig::default(),
            db: DbConfig::default(),
            simple_search: SimpleSearchConfig::default(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            dsn: PathBuf::from("sent.db"),
            journal_mode: "wal".to_string(),
            retention_days: 7,
        }
    }
}

impl Default for SimpleSearchConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            base: "https://www.berlin.de/polizei/service/versammlungsbehoerde/versammlungen-aufzuege/"
                .to_string(),
            feed: "index.php/index/all.json?datum=".to_string(),
            detail: "index.php/detail/".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut settings: Settings = serde_yaml::from_str(content)?;
        settings.apply_defaults();
        settings.dir = std::path::absolute(&settings.dir).map_err(|source| ConfigError::Dir {
            path: settings.dir.clone(),
            source,
        })?;
        Ok(settings)
    }

    /// Fill fields an explicit but empty YAML value left blank
    fn apply_defaults(&mut self) {
        let defaults = Settings::default();

        if self.mastodon.user_agent.is_empty() {
            self.mastodon.user_agent = DEFAULT_USER_AGENT.to_string();
        }
        if self.db.dsn.as_os_str().is_empty() {
            self.db.dsn = defaults.db.dsn;
        }
        if self.simple_search.base.is_empty() {
            self.simple_search.base = defaults.simple_search.base;
        }
        if self.simple_search.feed.is_empty() {
            self.simple_search.feed = defaults.simple_search.feed;
        }
        if self.simple_search.detail.is_empty() {
            self.simple_search.detail = defaults.simple_search.detail;
        }
        if self.dir.as_os_str().is_empty() {
            self.dir = defaults.dir;
        }
        if self.timezone.is_empty() {
            self.timezone = defaults.timezone;
        }
    }

    pub fn time_zone(&self) -> Result<Tz, ConfigError> {
        Tz::from_str(&self.timezone).map_err(|_| ConfigError::TimeZone(self.timezone.clone()))
    }

    /// Database path, relative paths resolved against `dir`
    pub fn database_path(&self) -> PathBuf {
        if self.db.dsn.is_absolute() {
            self.db.dsn.clone()
        } else {
            self.dir.join(&self.db.dsn)
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            journal_mode: Some(self.db.journal_mode.clone()).filter(|mode| !mode.is_empty()),
            retention_days: self.db.retention_days,
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings.db.dsn, PathBuf::from("sent.db"));
        assert_eq!(settings.db.retention_days, 7);
        assert_eq!(settings.mastodon.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(settings.simple_search.feed, "index.php/index/all.json?datum=");
        assert_eq!(settings.tags.len(), DEFAULT_TAGS.len());
        assert_eq!(settings.time_zone().unwrap(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
dir: /var/lib/bdemo
mastodon:
  server: https://botsin.space
  token: secret
  user_agent: test-agent/1.0
db:
  dsn: events.db
  journal_mode: ""
simple_search:
  title: Versammlungen in Berlin
  url: https://example.org/
tags: [Demo, Berlin]
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.mastodon.server, "https://botsin.space");
        assert_eq!(settings.mastodon.token, "secret");
        assert_eq!(settings.mastodon.user_agent, "test-agent/1.0");
        assert_eq!(settings.simple_search.base, "https://example.org/");
        assert_eq!(settings.simple_search.detail, "index.php/detail/");
        assert_eq!(settings.tags, vec!["Demo", "Berlin"]);
        assert_eq!(settings.database_path(), PathBuf::from("/var/lib/bdemo/events.db"));
        assert!(settings.store_options().journal_mode.is_none());
    }

    #[test]
    fn test_relative_dir_made_absolute() {
        let settings = Settings::from_yaml("dir: data").unwrap();
        assert!(settings.dir.is_absolute());
        assert!(settings.dir.ends_with("data"));
        assert!(settings.database_path().is_absolute());

        let defaults = Settings::from_yaml("{}").unwrap();
        assert_eq!(defaults.dir, std::env::current_dir().unwrap());
    }

    #[test]
    fn test_invalid_time_zone() {
        let settings = Settings::from_yaml("timezone: Mars/Olympus").unwrap();
        assert!(matches!(settings.time_zone(), Err(ConfigError::TimeZone(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(Settings::from_yaml("db: [1, 2"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_round_trip_through_show_config() {
        let settings = Settings::default();
        let yaml = settings.to_yaml().unwrap();
        assert!(yaml.contains("simple_search:"));
        assert!(yaml.contains("url:"));
        assert!(yaml.contains("berlin.de/polizei"));
    }
}
