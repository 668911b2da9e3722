//! Collector configuration from environment variables.

use std::env;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use nonzero_ext::nonzero;
use thiserror::Error;

use crate::services::aggregator::NegativeFlow;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must not be zero")]
    Zero { key: &'static str },
    #[error("end date {end} is before start date {start}")]
    EmptyRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone)]
pub struct SourceEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub enabled: bool,
    pub top_entities: usize,
    pub tail_per_entity: usize,
    pub seed: u64,
}

/// Configuration for one collection run.
///
/// Loaded from environment variables with defaults matching a weekly
/// research window.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub cadence_days: u32,
    pub page_size: u32,
    pub rpm_limit: NonZeroU32,
    pub page_guard: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub subnets: Vec<u16>,
    pub lookback_hours: u32,
    pub nakamoto_threshold: f64,
    pub negative_flow: NegativeFlow,
    pub skip_zero_participants: bool,
    pub validators_file: Option<String>,
    pub beacon_batch: usize,
    pub sample: SampleConfig,
    pub taostats: SourceEndpoint,
    pub beacon: SourceEndpoint,
    pub clickhouse_url: String,
    pub api_addr: String,
}

impl CollectorConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `STAKESPREAD_START_DATE` / `STAKESPREAD_END_DATE` (YYYY-MM-DD)
    /// - `STAKESPREAD_CADENCE_DAYS` (default: 7)
    /// - `STAKESPREAD_PAGE_SIZE` (default: 200)
    /// - `STAKESPREAD_RPM_LIMIT` (default: 5)
    /// - `STAKESPREAD_SUBNETS` (comma separated netuids, default: 64)
    /// - `STAKESPREAD_NAKAMOTO_THRESHOLD` (default: 0.33)
    /// - `STAKESPREAD_CLAMP_NEGATIVE_FLOW` (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let start_date = parse_or(&lookup, "STAKESPREAD_START_DATE", default_date(2025, 2, 13))?;
        let end_date = parse_or(&lookup, "STAKESPREAD_END_DATE", default_date(2025, 8, 13))?;
        if end_date < start_date {
            return Err(ConfigError::EmptyRange { start: start_date, end: end_date });
        }

        let cadence_days: u32 = parse_or(&lookup, "STAKESPREAD_CADENCE_DAYS", 7)?;
        if cadence_days == 0 {
            return Err(ConfigError::Zero { key: "STAKESPREAD_CADENCE_DAYS" });
        }
        let page_size: u32 = parse_or(&lookup, "STAKESPREAD_PAGE_SIZE", 200)?;
        if page_size == 0 {
            return Err(ConfigError::Zero { key: "STAKESPREAD_PAGE_SIZE" });
        }
        let rpm_limit = parse_or(&lookup, "STAKESPREAD_RPM_LIMIT", nonzero!(5u32))
            .map_err(|e| match e {
                ConfigError::Invalid { key, value } if value.trim() == "0" => ConfigError::Zero { key },
                other => other,
            })?;

        let threshold: f64 = parse_or(&lookup, "STAKESPREAD_NAKAMOTO_THRESHOLD", 0.33)?;
        if !(0.0..1.0).contains(&threshold) {
            return Err(ConfigError::Invalid {
                key: "STAKESPREAD_NAKAMOTO_THRESHOLD",
                value: threshold.to_string(),
            });
        }

        let clamp: bool = parse_or(&lookup, "STAKESPREAD_CLAMP_NEGATIVE_FLOW", true)?;

        Ok(Self {
            start: midnight(start_date),
            end: midnight(end_date),
            cadence_days,
            page_size,
            rpm_limit,
            page_guard: Duration::from_millis(parse_or(&lookup, "STAKESPREAD_PAGE_GUARD_MS", 1_500)?),
            max_retries: parse_or(&lookup, "STAKESPREAD_MAX_RETRIES", 5)?,
            retry_delay: Duration::from_millis(parse_or(&lookup, "STAKESPREAD_RETRY_DELAY_MS", 1_000)?),
            subnets: parse_list(&lookup, "STAKESPREAD_SUBNETS", vec![64])?,
            lookback_hours: parse_or(&lookup, "STAKESPREAD_LOOKBACK_HOURS", 24)?,
            nakamoto_threshold: threshold,
            negative_flow: if clamp { NegativeFlow::Clamp } else { NegativeFlow::Keep },
            skip_zero_participants: parse_or(&lookup, "STAKESPREAD_SKIP_ZERO_PARTICIPANTS", false)?,
            validators_file: lookup("STAKESPREAD_VALIDATORS_FILE").filter(|s| !s.is_empty()),
            beacon_batch: parse_or(&lookup, "STAKESPREAD_BEACON_BATCH", 100)?,
            sample: SampleConfig {
                enabled: parse_or(&lookup, "STAKESPREAD_SAMPLE_ENABLED", false)?,
                top_entities: parse_or(&lookup, "STAKESPREAD_SAMPLE_TOP_ENTITIES", 20)?,
                tail_per_entity: parse_or(&lookup, "STAKESPREAD_SAMPLE_TAIL_PER_ENTITY", 50)?,
                seed: parse_or(&lookup, "STAKESPREAD_SAMPLE_SEED", 42)?,
            },
            taostats: SourceEndpoint {
                base_url: lookup("TAOSTATS_BASE_URL")
                    .unwrap_or_else(|| "https://api.taostats.io/api".to_string()),
                api_key: lookup("TAOSTATS_API_KEY"),
            },
            beacon: SourceEndpoint {
                base_url: lookup("BEACON_BASE_URL")
                    .unwrap_or_else(|| "https://beaconcha.in/api/v1".to_string()),
                api_key: lookup("BEACON_API_KEY"),
            },
            clickhouse_url: lookup("CLICKHOUSE_URL")
                .unwrap_or_else(|| "http://localhost:8123".to_string()),
            api_addr: lookup("STAKESPREAD_API_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
        })
    }
}

fn default_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        _ => Ok(default),
    }
}

fn parse_list<F, T>(lookup: &F, key: &'static str, default: Vec<T>) -> Result<Vec<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse().map_err(|_| ConfigError::Invalid { key, value: s.to_string() })
            })
            .collect(),
        _ => Ok(default),
    }
}
