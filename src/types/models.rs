use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one subject as reported by a source: a beacon validator index
/// or a subnet hotkey.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubjectId {
    Validator(u64),
    Hotkey(String),
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectId::Validator(index) => write!(f, "{}", index),
            SubjectId::Hotkey(hotkey) => f.write_str(hotkey),
        }
    }
}

/// Stable key of an economic owner.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey(String);

pub const LEGACY_PREFIX: &str = "legacy_";

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn legacy(fallback: impl fmt::Display) -> Self {
        Self(format!("{}{}", LEGACY_PREFIX, fallback))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for keys minted because the real owner could not be recovered.
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(LEGACY_PREFIX)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source-specific numeric payload of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordValues {
    Subnet {
        netuid: u16,
        uid: Option<u64>,
        coldkey: Option<String>,
        stake: f64,
        emission: f64,
        incentive: f64,
        consensus: f64,
        trust: f64,
        active: bool,
    },
    Beacon {
        balance: u64,
        effective_balance: u64,
        epoch: u64,
        week: Option<u64>,
        week_end: Option<DateTime<Utc>>,
    },
}

/// One normalized observation returned by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub subject: SubjectId,
    pub block: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub values: RecordValues,
}

impl RawRecord {
    /// Level metric held at the observation: stake or effective balance.
    pub fn stake(&self) -> f64 {
        match &self.values {
            RecordValues::Subnet { stake, .. } => *stake,
            RecordValues::Beacon { effective_balance, .. } => *effective_balance as f64,
        }
    }

    /// Reward rate reported by the source itself. Beacon records carry no rate;
    /// their reward is derived as a flow between periods.
    pub fn reward_rate(&self) -> f64 {
        match &self.values {
            RecordValues::Subnet { emission, .. } => *emission,
            RecordValues::Beacon { .. } => 0.0,
        }
    }

    /// Miner incentive; beacon records have none.
    pub fn incentive(&self) -> Option<f64> {
        match &self.values {
            RecordValues::Subnet { incentive, .. } => Some(*incentive),
            RecordValues::Beacon { .. } => None,
        }
    }

    /// Balance used by the flow aggregator.
    pub fn balance(&self) -> f64 {
        match &self.values {
            RecordValues::Subnet { stake, .. } => *stake,
            RecordValues::Beacon { balance, .. } => *balance as f64,
        }
    }

    /// Total order used to pick the most recent record of a subject.
    ///
    /// Block first, then timestamp, with a missing value below any present one.
    /// Full ties fall through to every payload field, so two records compare
    /// equal only when they are identical and the winner never depends on
    /// input order.
    pub fn recency_cmp(&self, other: &Self) -> Ordering {
        self.block
            .cmp(&other.block)
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| payload_cmp(&self.values, &other.values))
    }
}

fn payload_cmp(a: &RecordValues, b: &RecordValues) -> Ordering {
    match (a, b) {
        (
            RecordValues::Subnet {
                netuid: na,
                uid: ua,
                coldkey: ka,
                stake: sa,
                emission: ea,
                incentive: ia,
                consensus: ca,
                trust: ta,
                active: aa,
            },
            RecordValues::Subnet {
                netuid: nb,
                uid: ub,
                coldkey: kb,
                stake: sb,
                emission: eb,
                incentive: ib,
                consensus: cb,
                trust: tb,
                active: ab,
            },
        ) => na
            .cmp(nb)
            .then_with(|| ua.cmp(ub))
            .then_with(|| ka.cmp(kb))
            .then_with(|| sa.total_cmp(sb))
            .then_with(|| ea.total_cmp(eb))
            .then_with(|| ia.total_cmp(ib))
            .then_with(|| ca.total_cmp(cb))
            .then_with(|| ta.total_cmp(tb))
            .then_with(|| aa.cmp(ab)),
        (
            RecordValues::Beacon { balance: ba, effective_balance: fa, epoch: pa, week: wa, week_end: da },
            RecordValues::Beacon { balance: bb, effective_balance: fb, epoch: pb, week: wb, week_end: db },
        ) => pa
            .cmp(pb)
            .then_with(|| ba.cmp(bb))
            .then_with(|| fa.cmp(fb))
            .then_with(|| wa.cmp(wb))
            .then_with(|| da.cmp(db)),
        (RecordValues::Subnet { .. }, RecordValues::Beacon { .. }) => Ordering::Less,
        (RecordValues::Beacon { .. }, RecordValues::Subnet { .. }) => Ordering::Greater,
    }
}

/// Deduplicated state of every subject within one window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    records: BTreeMap<SubjectId, RawRecord>,
}

impl Snapshot {
    pub(crate) fn from_map(records: BTreeMap<SubjectId, RawRecord>) -> Self {
        Self { records }
    }

    pub fn get(&self, subject: &SubjectId) -> Option<&RawRecord> {
        self.records.get(subject)
    }

    pub fn records(&self) -> impl Iterator<Item = &RawRecord> {
        self.records.values()
    }

    pub fn into_records(self) -> Vec<RawRecord> {
        self.records.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One fixed time interval of the research window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub index: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn label(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPeriodSummary {
    pub dataset: String,
    pub period: Period,
    pub entity: EntityKey,
    pub subjects: u32,
    pub stake_total: f64,
    pub reward_total: f64,
    pub stake_share: f64,
    pub reward_share: f64,
}

/// Quantity whose distribution an inequality point measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Entity stake held at the anchor.
    Stake,
    /// Entity reward, a rate or a flow depending on the source.
    Reward,
    /// Per-miner incentive share, measured over subjects rather than entities.
    Incentive,
    /// Active validators per entity.
    Validators,
}

impl Metric {
    /// Metrics carried on entity-period summary rows.
    pub const ENTITY: [Metric; 2] = [Metric::Stake, Metric::Reward];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Stake => "stake",
            Metric::Reward => "reward",
            Metric::Incentive => "incentive",
            Metric::Validators => "validators",
        }
    }

    /// Value of an entity row, for the metrics summary rows carry.
    pub fn value_of(&self, summary: &EntityPeriodSummary) -> Option<f64> {
        match self {
            Metric::Stake => Some(summary.stake_total),
            Metric::Reward => Some(summary.reward_total),
            Metric::Incentive | Metric::Validators => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InequalityPoint {
    pub dataset: String,
    pub period: Period,
    pub metric: Metric,
    pub gini: f64,
    pub nakamoto: u32,
    pub participants: u32,
    pub total_value: f64,
    pub top_share: f64,
}

/// Outcome of collecting one window from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    pub dataset: String,
    pub period: Period,
    pub pages: u32,
    pub records: u32,
    pub skipped_records: u32,
    pub identity_gaps: u32,
    pub complete: bool,
    pub error: Option<String>,
}

impl WindowReport {
    pub fn new(dataset: &str, period: Period) -> Self {
        Self {
            dataset: dataset.to_string(),
            period,
            pages: 0,
            records: 0,
            skipped_records: 0,
            identity_gaps: 0,
            complete: true,
            error: None,
        }
    }

    /// Flags the window incomplete. Several causes are joined in one message.
    pub fn mark_gap(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.complete = false;
        self.error = Some(match self.error.take() {
            Some(previous) => format!("{}; {}", previous, error),
            None => error,
        });
    }

    /// Folds another source window of the same period into this report.
    pub fn absorb(&mut self, other: &WindowReport) {
        self.pages += other.pages;
        self.records += other.records;
        self.skipped_records += other.skipped_records;
        self.identity_gaps += other.identity_gaps;
        if let Some(error) = &other.error {
            self.mark_gap(format!("{}: {}", other.dataset, error));
        } else if !other.complete {
            self.mark_gap(format!("{}: incomplete", other.dataset));
        }
    }
}
