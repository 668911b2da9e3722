use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use super::resolver::EntityResolver;
use crate::types::models::{EntityKey, EntityPeriodSummary, Period, Snapshot, SubjectId};

/// What the flow aggregator does with a balance that went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegativeFlow {
    /// Count decreases as zero issuance.
    Clamp,
    /// Keep the negative delta (slashing, exits, withdrawals).
    Keep,
}

#[derive(Error, Debug, PartialEq)]
pub enum AggregationError {
    #[error("period {got} processed after period {last}; flow periods must be strictly increasing")]
    PeriodOutOfOrder { last: u32, got: u32 },
}

/// Running totals of one entity within one period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntityTotals {
    pub subjects: u32,
    pub stake: f64,
    pub reward: f64,
}

impl EntityTotals {
    pub fn add(&mut self, stake: f64, reward: f64, weight: f64) {
        self.subjects += 1;
        self.stake += stake * weight;
        self.reward += reward * weight;
    }

    pub fn merge(&mut self, other: &EntityTotals) {
        self.subjects += other.subjects;
        self.stake += other.stake;
        self.reward += other.reward;
    }
}

/// Per-entity totals of one period. Merging is commutative and associative,
/// so accumulators built over disjoint batches can be combined in any order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodAccumulator {
    totals: BTreeMap<EntityKey, EntityTotals>,
}

impl PeriodAccumulator {
    pub fn add(&mut self, entity: EntityKey, stake: f64, reward: f64, weight: f64) {
        self.totals.entry(entity).or_default().add(stake, reward, weight);
    }

    pub fn merge(&mut self, other: PeriodAccumulator) {
        for (entity, totals) in other.totals {
            self.totals.entry(entity).or_default().merge(&totals);
        }
    }

    pub fn entity_count(&self) -> usize {
        self.totals.len()
    }

    /// Turns totals into summary rows with shares of the period-wide total.
    pub fn finalize(self, dataset: &str, period: Period) -> Vec<EntityPeriodSummary> {
        let stake_sum: f64 = self.totals.values().map(|t| t.stake).sum();
        let reward_sum: f64 = self.totals.values().map(|t| t.reward).sum();

        self.totals
            .into_iter()
            .map(|(entity, totals)| EntityPeriodSummary {
                dataset: dataset.to_string(),
                period,
                entity,
                subjects: totals.subjects,
                stake_total: totals.stake,
                reward_total: totals.reward,
                stake_share: share(totals.stake, stake_sum),
                reward_share: share(totals.reward, reward_sum),
            })
            .collect()
    }
}

fn share(value: f64, total: f64) -> f64 {
    if total > 0.0 {
        value / total
    } else {
        0.0
    }
}

/// Per-subject sample weights assigned when a subsample is drawn.
/// Subjects without an entry count once.
#[derive(Debug, Clone, Default)]
pub struct SampleWeights {
    weights: HashMap<SubjectId, f64>,
}

impl SampleWeights {
    pub fn new(weights: HashMap<SubjectId, f64>) -> Self {
        Self { weights }
    }

    pub fn weight_of(&self, subject: &SubjectId) -> f64 {
        self.weights.get(subject).copied().unwrap_or(1.0)
    }
}

/// Level totals of one snapshot, before shares are taken.
pub fn accumulate<R: EntityResolver + ?Sized>(
    snapshot: &Snapshot,
    resolver: &R,
    weights: &SampleWeights,
) -> PeriodAccumulator {
    let mut acc = PeriodAccumulator::default();
    for record in snapshot.records() {
        let weight = weights.weight_of(&record.subject);
        acc.add(resolver.resolve(record), record.stake(), record.reward_rate(), weight);
    }
    acc
}

/// Level aggregation: stake held and reward rate reported at the window end.
pub fn aggregate<R: EntityResolver + ?Sized>(
    dataset: &str,
    period: Period,
    snapshot: &Snapshot,
    resolver: &R,
    weights: &SampleWeights,
) -> Vec<EntityPeriodSummary> {
    accumulate(snapshot, resolver, weights).finalize(dataset, period)
}

/// Last seen balance per subject, carried from one period to the next.
#[derive(Debug, Clone, Default)]
pub struct BalanceBook {
    balances: HashMap<SubjectId, f64>,
    last_period: Option<u32>,
}

impl BalanceBook {
    pub fn balance_of(&self, subject: &SubjectId) -> Option<f64> {
        self.balances.get(subject).copied()
    }

    pub fn last_period(&self) -> Option<u32> {
        self.last_period
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

/// Issuance earned since the previous observation of a subject.
///
/// A subject seen for the first time contributes nothing.
pub fn flow_delta(previous: Option<f64>, current: f64, policy: NegativeFlow) -> f64 {
    match previous {
        None => 0.0,
        Some(previous) => {
            let delta = current - previous;
            match policy {
                NegativeFlow::Clamp => delta.max(0.0),
                NegativeFlow::Keep => delta,
            }
        }
    }
}

/// Flow aggregation: reward is the balance change since the previous period,
/// stake is the level held now.
///
/// Periods must be fed in strictly increasing order; subjects absent from this
/// snapshot keep their last known balance.
pub fn aggregate_delta<R: EntityResolver + ?Sized>(
    mut book: BalanceBook,
    dataset: &str,
    period: Period,
    snapshot: &Snapshot,
    resolver: &R,
    weights: &SampleWeights,
    policy: NegativeFlow,
) -> Result<(Vec<EntityPeriodSummary>, BalanceBook), AggregationError> {
    if let Some(last) = book.last_period {
        if period.index <= last {
            return Err(AggregationError::PeriodOutOfOrder { last, got: period.index });
        }
    }

    let mut acc = PeriodAccumulator::default();
    for record in snapshot.records() {
        let balance = record.balance();
        let flow = flow_delta(book.balance_of(&record.subject), balance, policy);
        let weight = weights.weight_of(&record.subject);
        acc.add(resolver.resolve(record), record.stake(), flow, weight);
        book.balances.insert(record.subject.clone(), balance);
    }
    book.last_period = Some(period.index);

    Ok((acc.finalize(dataset, period), book))
}
