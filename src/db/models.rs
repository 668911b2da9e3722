use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::models::{EntityPeriodSummary, InequalityPoint, WindowReport};

pub fn to_datetime(ts: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(ts.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct EntityPeriodRecord {
    pub dataset: String,
    pub period_index: u32,
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub period_start: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub period_end: OffsetDateTime,
    pub entity: String,
    pub subjects: u32,
    pub stake_total: f64,
    pub reward_total: f64,
    pub stake_share: f64,
    pub reward_share: f64,
}

impl From<&EntityPeriodSummary> for EntityPeriodRecord {
    fn from(summary: &EntityPeriodSummary) -> Self {
        Self {
            dataset: summary.dataset.clone(),
            period_index: summary.period.index,
            period_start: to_datetime(summary.period.start),
            period_end: to_datetime(summary.period.end),
            entity: summary.entity.to_string(),
            subjects: summary.subjects,
            stake_total: summary.stake_total,
            reward_total: summary.reward_total,
            stake_share: summary.stake_share,
            reward_share: summary.reward_share,
        }
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct InequalityRecord {
    pub dataset: String,
    pub period_index: u32,
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub period_start: OffsetDateTime,
    pub metric: String,
    pub gini: f64,
    pub nakamoto: u32,
    pub participants: u32,
    pub total_value: f64,
    pub top_share: f64,
}

impl From<&InequalityPoint> for InequalityRecord {
    fn from(point: &InequalityPoint) -> Self {
        Self {
            dataset: point.dataset.clone(),
            period_index: point.period.index,
            period_start: to_datetime(point.period.start),
            metric: point.metric.as_str().to_string(),
            gini: point.gini,
            nakamoto: point.nakamoto,
            participants: point.participants,
            total_value: point.total_value,
            top_share: point.top_share,
        }
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct WindowReportRecord {
    pub dataset: String,
    pub period_index: u32,
    #[serde(with = "clickhouse::serde::time::datetime")]
    pub period_start: OffsetDateTime,
    pub pages: u32,
    pub records: u32,
    pub skipped_records: u32,
    pub identity_gaps: u32,
    pub complete: bool,
    pub error: String,
}

impl From<&WindowReport> for WindowReportRecord {
    fn from(report: &WindowReport) -> Self {
        Self {
            dataset: report.dataset.clone(),
            period_index: report.period.index,
            period_start: to_datetime(report.period.start),
            pages: report.pages,
            records: report.records,
            skipped_records: report.skipped_records,
            identity_gaps: report.identity_gaps,
            complete: report.complete,
            error: report.error.clone().unwrap_or_default(),
        }
    }
}
