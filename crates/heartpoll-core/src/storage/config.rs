//! TOML-based application configuration.
//!
//! Holds:
//! - Bot credential and broadcast channel
//! - The ordered subject list
//! - Announcement thresholds and tier templates
//! - Scheduled rollover times and the reference timezone
//! - Spam cooldown
//!
//! Configuration is stored at `<data_dir>/config.toml`; `HEARTPOLL_TOKEN`
//! and `HEARTPOLL_CHANNEL_ID` (or the bare `TOKEN` / `CHANNEL_ID`) override
//! the file.

use chrono::{Duration, FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::announce::Tier;
use crate::error::ConfigError;
use crate::integrations::telegram::{vote_callback_data, MAX_CALLBACK_DATA_BYTES};
use crate::vote::{Polarity, SubjectSet};

/// Chat transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot API token. Usually supplied through the environment.
    #[serde(default)]
    pub token: String,
    /// Channel that receives announcements.
    #[serde(default)]
    pub channel_id: i64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

/// Announcement thresholds.
///
/// `daily_heart` and `daily_black` are exceeded strictly (`>`); the rollover
/// and monthly thresholds are reached inclusively (`>=`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_daily")]
    pub daily_heart: u64,
    #[serde(default = "default_daily")]
    pub daily_black: u64,
    #[serde(default = "default_rollover")]
    pub rollover_super: u64,
    #[serde(default = "default_rollover")]
    pub rollover_not: u64,
    #[serde(default = "default_monthly")]
    pub monthly: u64,
}

/// Scheduler settings. Times are `HH:MM` in the reference timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_daily_at")]
    pub daily_rollover_at: String,
    #[serde(default = "default_monthly_at")]
    pub monthly_rollover_at: String,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Reference timezone as a fixed UTC offset, e.g. `+03:00`.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

/// Asset and message template for one tier.
///
/// Templates may use `{subject}`, `{positive}` and `{negative}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierConfig {
    /// Photo URL or file id sent with the announcement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    pub template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTemplates {
    #[serde(rename = "super", default = "default_super_tier")]
    pub super_tier: TierConfig,
    #[serde(rename = "not", default = "default_not_tier")]
    pub not_tier: TierConfig,
    #[serde(default = "default_average_tier")]
    pub average: TierConfig,
    #[serde(default = "default_champion_tier")]
    pub champion: TierConfig,
    #[serde(default = "default_loser_tier")]
    pub loser: TierConfig,
}

impl TierTemplates {
    pub fn get(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Super => &self.super_tier,
            Tier::Not => &self.not_tier,
            Tier::Average => &self.average,
            Tier::Champion => &self.champion,
            Tier::Loser => &self.loser,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default = "default_subjects")]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub spam: SpamConfig,
    #[serde(default)]
    pub tiers: TierTemplates,
}

// Default functions
fn default_api_base() -> String {
    "https://api.telegram.org".into()
}
fn default_poll_timeout() -> u64 {
    30
}
fn default_daily() -> u64 {
    3
}
fn default_rollover() -> u64 {
    4
}
fn default_monthly() -> u64 {
    50
}
fn default_daily_at() -> String {
    "00:05".into()
}
fn default_monthly_at() -> String {
    "00:10".into()
}
fn default_tick_secs() -> u64 {
    60
}
fn default_utc_offset() -> String {
    "+00:00".into()
}
fn default_cooldown_secs() -> u64 {
    30
}
fn default_subjects() -> Vec<String> {
    vec!["Alen".into(), "Katya".into(), "Kuzya".into()]
}
fn tier(template: &str) -> TierConfig {
    TierConfig {
        asset: None,
        template: template.into(),
    }
}
fn default_super_tier() -> TierConfig {
    tier("✨ Today <b>{subject}</b> is a superstar! Already {positive} ❤️")
}
fn default_not_tier() -> TierConfig {
    tier("💔 Today <b>{subject}</b> is not it… {negative} 🖤")
}
fn default_average_tier() -> TierConfig {
    tier("🙂 <b>{subject}</b> had an average day: {positive} ❤️ / {negative} 🖤")
}
fn default_champion_tier() -> TierConfig {
    tier("🏆 <b>{subject}</b> is the champion of the month with {positive} ❤️")
}
fn default_loser_tier() -> TierConfig {
    tier("🥀 <b>{subject}</b> closes the month with {negative} 🖤")
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            channel_id: 0,
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            daily_heart: default_daily(),
            daily_black: default_daily(),
            rollover_super: default_rollover(),
            rollover_not: default_rollover(),
            monthly: default_monthly(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_rollover_at: default_daily_at(),
            monthly_rollover_at: default_monthly_at(),
            tick_secs: default_tick_secs(),
            utc_offset: default_utc_offset(),
        }
    }
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for TierTemplates {
    fn default() -> Self {
        Self {
            super_tier: default_super_tier(),
            not_tier: default_not_tier(),
            average: default_average_tier(),
            champion: default_champion_tier(),
            loser: default_loser_tier(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig::default(),
            subjects: default_subjects(),
            thresholds: ThresholdConfig::default(),
            schedule: ScheduleConfig::default(),
            spam: SpamConfig::default(),
            tiers: TierTemplates::default(),
        }
    }
}

/// Parse `+HH:MM` / `-HH:MM` (or `Z` / `UTC`) into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    raw.parse::<FixedOffset>().ok()
}

fn parse_time(key: &str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| ConfigError::InvalidValue {
        key: key.into(),
        message: format!("expected HH:MM, got '{raw}': {e}"),
    })
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Default location: `$HEARTPOLL_CONFIG` or `<data_dir>/config.toml`.
    pub fn path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os("HEARTPOLL_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("."),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from the default location, apply environment overrides and
    /// validate. A missing file is replaced by the defaults on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, the
    /// defaults cannot be written, or a value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Self::load_from(&Self::path()?)?;
        cfg.apply_env_from(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit path without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Override token and channel from environment variables.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| lookup(*k).filter(|v| !v.trim().is_empty()))
        };
        if let Some(token) = pick(&["HEARTPOLL_TOKEN", "TOKEN"]) {
            self.bot.token = token.trim().to_string();
        }
        if let Some(channel) = pick(&["HEARTPOLL_CHANNEL_ID", "CHANNEL_ID"]) {
            self.bot.channel_id =
                channel
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "bot.channel_id".into(),
                        message: format!("'{channel}' is not an integer"),
                    })?;
        }
        Ok(())
    }

    /// Check every value the pipeline parses at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for subject in self.subject_set()?.iter() {
            let data = vote_callback_data(subject.name(), Polarity::Negative);
            if data.len() > MAX_CALLBACK_DATA_BYTES {
                return Err(ConfigError::InvalidValue {
                    key: "subjects".into(),
                    message: format!(
                        "'{subject}' is too long for vote buttons ({} of {MAX_CALLBACK_DATA_BYTES} bytes)",
                        data.len()
                    ),
                });
            }
        }
        self.utc_offset()?;
        self.daily_rollover_at()?;
        self.monthly_rollover_at()?;
        if self.spam.cooldown_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "spam.cooldown_secs".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.schedule.tick_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "schedule.tick_secs".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// The bot token; its absence is fatal for anything that talks to the chat.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        if self.bot.token.is_empty() {
            Err(ConfigError::MissingKey("bot.token".into()))
        } else {
            Ok(&self.bot.token)
        }
    }

    pub fn subject_set(&self) -> Result<SubjectSet, ConfigError> {
        SubjectSet::new(self.subjects.iter().cloned())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        parse_utc_offset(&self.schedule.utc_offset).ok_or_else(|| ConfigError::InvalidValue {
            key: "schedule.utc_offset".into(),
            message: format!("expected +HH:MM, got '{}'", self.schedule.utc_offset),
        })
    }

    pub fn daily_rollover_at(&self) -> Result<NaiveTime, ConfigError> {
        parse_time("schedule.daily_rollover_at", &self.schedule.daily_rollover_at)
    }

    pub fn monthly_rollover_at(&self) -> Result<NaiveTime, ConfigError> {
        parse_time("schedule.monthly_rollover_at", &self.schedule.monthly_rollover_at)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.spam.cooldown_secs as i64)
    }

    /// Copy with the token masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.bot.token.is_empty() {
            copy.bot.token = "***".into();
        }
        copy
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.subjects, cfg.subjects);
        assert_eq!(parsed.thresholds.monthly, 50);
        assert_eq!(parsed.tiers.super_tier, cfg.tiers.super_tier);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            subjects = ["X", "Y"]
            [thresholds]
            monthly = 10
            "#,
        )
        .unwrap();
        assert_eq!(parsed.subjects, vec!["X", "Y"]);
        assert_eq!(parsed.thresholds.monthly, 10);
        assert_eq!(parsed.thresholds.daily_heart, 3);
        assert_eq!(parsed.spam.cooldown_secs, 30);
        assert_eq!(parsed.schedule.daily_rollover_at, "00:05");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("spam.cooldown_secs").as_deref(), Some("30"));
        assert_eq!(cfg.get("schedule.daily_rollover_at").as_deref(), Some("00:05"));
        assert!(cfg.get("schedule.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn env_overrides_token_and_channel() {
        let env: HashMap<&str, &str> =
            HashMap::from([("TOKEN", "abc:123"), ("HEARTPOLL_CHANNEL_ID", "-10042")]);
        let mut cfg = Config::default();
        cfg.apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.bot.token, "abc:123");
        assert_eq!(cfg.bot.channel_id, -100_42);
    }

    #[test]
    fn env_rejects_non_numeric_channel() {
        let mut cfg = Config::default();
        let result = cfg.apply_env_from(|k| (k == "CHANNEL_ID").then(|| "chan".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn missing_token_is_reported() {
        let cfg = Config::default();
        assert!(matches!(cfg.require_token(), Err(ConfigError::MissingKey(_))));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_ok());

        cfg.schedule.daily_rollover_at = "25:00".into();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.schedule.utc_offset = "Moscow".into();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.subjects.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.spam.cooldown_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn subject_must_fit_in_callback_data() {
        let mut cfg = Config::default();
        cfg.subjects = vec!["Александра Петровна Иванова".into()];
        match cfg.validate() {
            Err(ConfigError::InvalidValue { key, message }) => {
                assert_eq!(key, "subjects");
                assert!(message.contains("66 of 64 bytes"), "{message}");
            }
            other => panic!("expected invalid subject, got {other:?}"),
        }

        cfg.subjects = vec!["Александра Иванова".into()];
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_utc_offset("+03:00"), FixedOffset::east_opt(3 * 3600));
        assert_eq!(parse_utc_offset("-05:30"), FixedOffset::east_opt(-(5 * 3600 + 1800)));
        assert_eq!(parse_utc_offset("Z"), FixedOffset::east_opt(0));
        assert!(parse_utc_offset("03:00").is_none());
        assert!(parse_utc_offset("+24:00").is_none());
        assert_eq!(parse_utc_offset(" utc "), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("+0930"), FixedOffset::east_opt(9 * 3600 + 1800));
    }

    #[test]
    fn redacted_masks_token() {
        let mut cfg = Config::default();
        cfg.bot.token = "secret".into();
        assert_eq!(cfg.redacted().bot.token, "***");
        assert_eq!(cfg.bot.token, "secret");
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.subjects.len(), 3);

        std::fs::write(&path, "subjects = [\"Solo\"]\n").unwrap();
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.subjects, vec!["Solo"]);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "subjects = 12").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::ParseFailed(_))));
    }
}
