//! Configuration file support for Vitals.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/vitals/config.toml`.

use crate::{Domain, Error, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub users: Vec<UserProfile>,

    #[serde(
        default = "ReminderRules::blood_pressure",
        deserialize_with = "blood_pressure_rules"
    )]
    pub blood_pressure: ReminderRules,

    #[serde(default = "ReminderRules::weight", deserialize_with = "weight_rules")]
    pub weight: ReminderRules,

    #[serde(default)]
    pub medication: MedicationConfig,

    #[serde(default)]
    pub workout: WorkoutConfig,

    #[serde(default)]
    pub channels: ChannelsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            scheduler: SchedulerConfig::default(),
            users: Vec::new(),
            blood_pressure: ReminderRules::blood_pressure(),
            weight: ReminderRules::weight(),
            medication: MedicationConfig::default(),
            workout: WorkoutConfig::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Scheduler loop configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
        }
    }
}

/// One of the statically configured users
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Offset of the user's local day boundary from UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl UserProfile {
    pub fn new(id: &str, utc_offset_minutes: i32) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            utc_offset_minutes,
        }
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            Error::Config(format!(
                "User {} has an out-of-range utc_offset_minutes ({})",
                self.id, self.utc_offset_minutes
            ))
        })
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Timing and gating parameters for a measured domain
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReminderRules {
    /// Used until enough history exists to adapt
    pub default_hour: u32,
    pub min_hour: u32,
    pub max_hour: u32,
    /// Quiet interval required since the last reading
    pub min_gap_hours: i64,
    /// Allowed distance from the preferred hour
    #[serde(default = "default_hour_tolerance")]
    pub hour_tolerance: u32,
    /// History window for adaptive timing and escalation
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

impl ReminderRules {
    /// Evening measurement window
    pub fn blood_pressure() -> Self {
        Self {
            default_hour: 20,
            min_hour: 8,
            max_hour: 23,
            min_gap_hours: 12,
            hour_tolerance: default_hour_tolerance(),
            lookback_days: default_lookback_days(),
        }
    }

    /// Fasting morning measurement window
    pub fn weight() -> Self {
        Self {
            default_hour: 8,
            min_hour: 6,
            max_hour: 12,
            min_gap_hours: 12,
            hour_tolerance: default_hour_tolerance(),
            lookback_days: default_lookback_days(),
        }
    }
}

/// A `[blood_pressure]` or `[weight]` section; absent fields keep the
/// domain's own defaults
#[derive(Debug, Default, Deserialize)]
struct RulesOverride {
    default_hour: Option<u32>,
    min_hour: Option<u32>,
    max_hour: Option<u32>,
    min_gap_hours: Option<i64>,
    hour_tolerance: Option<u32>,
    lookback_days: Option<i64>,
}

impl RulesOverride {
    fn apply(self, base: ReminderRules) -> ReminderRules {
        ReminderRules {
            default_hour: self.default_hour.unwrap_or(base.default_hour),
            min_hour: self.min_hour.unwrap_or(base.min_hour),
            max_hour: self.max_hour.unwrap_or(base.max_hour),
            min_gap_hours: self.min_gap_hours.unwrap_or(base.min_gap_hours),
            hour_tolerance: self.hour_tolerance.unwrap_or(base.hour_tolerance),
            lookback_days: self.lookback_days.unwrap_or(base.lookback_days),
        }
    }
}

fn blood_pressure_rules<'de, D>(deserializer: D) -> std::result::Result<ReminderRules, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(RulesOverride::deserialize(deserializer)?.apply(ReminderRules::blood_pressure()))
}

fn weight_rules<'de, D>(deserializer: D) -> std::result::Result<ReminderRules, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(RulesOverride::deserialize(deserializer)?.apply(ReminderRules::weight()))
}

/// Medication reminder configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MedicationConfig {
    /// How long after a dose time a reminder may still go out
    #[serde(default = "default_grace_minutes")]
    pub grace_minutes: i64,

    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: i64,
}

impl Default for MedicationConfig {
    fn default() -> Self {
        Self {
            grace_minutes: default_grace_minutes(),
            snooze_minutes: default_snooze_minutes(),
        }
    }
}

/// Workout scheduling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkoutConfig {
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: i64,

    /// How many days past today sessions are created ahead of time
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: i64,
}

impl Default for WorkoutConfig {
    fn default() -> Self {
        Self {
            snooze_minutes: default_snooze_minutes(),
            lookahead_days: default_lookahead_days(),
        }
    }
}

/// Notification channel configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_log_channel")]
    pub log: ChannelSettings,

    #[serde(default)]
    pub outbox: ChannelSettings,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            log: default_log_channel(),
            outbox: ChannelSettings::default(),
        }
    }
}

/// Settings shared by every channel provider
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChannelSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Restrict delivery to these user IDs
    #[serde(default)]
    pub users: Option<Vec<String>>,

    /// Restrict delivery to these notification domains
    #[serde(default)]
    pub kinds: Option<Vec<Domain>>,

    #[serde(default = "default_max_actions")]
    pub max_actions: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            users: None,
            kinds: None,
            max_actions: default_max_actions(),
        }
    }
}

impl ChannelSettings {
    pub fn allows(&self, user_id: &str, domain: Domain) -> bool {
        self.enabled
            && self
                .users
                .as_ref()
                .map_or(true, |users| users.iter().any(|u| u == user_id))
            && self
                .kinds
                .as_ref()
                .map_or(true, |kinds| kinds.contains(&domain))
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("vitals")
}

fn default_tick_seconds() -> u64 {
    60
}

fn default_hour_tolerance() -> u32 {
    1
}

fn default_lookback_days() -> i64 {
    14
}

fn default_grace_minutes() -> i64 {
    120
}

fn default_snooze_minutes() -> i64 {
    15
}

fn default_lookahead_days() -> i64 {
    1
}

fn default_max_actions() -> usize {
    3
}

fn default_log_channel() -> ChannelSettings {
    ChannelSettings {
        enabled: true,
        ..ChannelSettings::default()
    }
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("vitals").join("config.toml")
    }

    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        for (domain, rules) in [
            (Domain::BloodPressure, &self.blood_pressure),
            (Domain::Weight, &self.weight),
        ] {
            if rules.min_hour > rules.max_hour || rules.max_hour > 23 {
                return Err(Error::Config(format!(
                    "{} hour band {}..={} is invalid",
                    domain, rules.min_hour, rules.max_hour
                )));
            }
        }
        for user in &self.users {
            user.offset()?;
        }
        if self.scheduler.tick_seconds == 0 {
            return Err(Error::Config("scheduler.tick_seconds must be positive".into()));
        }
        Ok(())
    }

    pub fn find_user(&self, user_id: &str) -> Result<&UserProfile> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))
    }

    pub fn rules_for(&self, domain: Domain) -> Result<&ReminderRules> {
        match domain {
            Domain::BloodPressure => Ok(&self.blood_pressure),
            Domain::Weight => Ok(&self.weight),
            other => Err(Error::Other(format!(
                "{} has no measurement reminder rules",
                other
            ))),
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.data.data_dir.join("vitals.json")
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.data.data_dir.join("outbox.jsonl")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
