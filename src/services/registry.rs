use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;

use super::aggregator::SampleWeights;
use super::resolver::{resolve_withdrawal_credential, CredentialResolver};
use crate::types::models::{EntityKey, SubjectId};

#[derive(Debug, Deserialize)]
struct RegistryFile {
    validators: Vec<RegistryEntry>,
}

#[derive(Debug, Deserialize)]
struct RegistryEntry {
    #[serde(deserialize_with = "index_from_any")]
    index: u64,
    withdrawal_credentials: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default, deserialize_with = "epoch_from_any")]
    activation_epoch: Option<u64>,
    #[serde(default, deserialize_with = "epoch_from_any")]
    exit_epoch: Option<u64>,
}

fn index_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Index {
        Number(u64),
        Text(String),
    }
    match Index::deserialize(deserializer)? {
        Index::Number(n) => Ok(n),
        Index::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn epoch_from_any<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Epoch {
        Number(u64),
        Text(String),
    }
    match Option::<Epoch>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Epoch::Number(n)) => Ok(Some(n)),
        Some(Epoch::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Validator {
    pub index: u64,
    pub entity: EntityKey,
    pub state: Option<String>,
    pub activation_epoch: Option<u64>,
    pub exit_epoch: Option<u64>,
}

impl Validator {
    /// Activated at or before `epoch` and not yet exited. A registry row
    /// without lifecycle epochs counts as active throughout.
    pub fn is_active_at(&self, epoch: u64) -> bool {
        self.activation_epoch.map_or(true, |a| a <= epoch) && self.exit_epoch.map_or(true, |e| e > epoch)
    }
}

/// Validator set with each validator resolved to its owner.
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    validators: Vec<Validator>,
}

/// Validators chosen for collection, with the weight each one stands for.
#[derive(Debug, Clone, Default)]
pub struct ValidatorSample {
    pub validators: Vec<Validator>,
    pub weights: HashMap<u64, f64>,
}

impl ValidatorSample {
    pub fn indices(&self) -> Vec<u64> {
        self.validators.iter().map(|v| v.index).collect()
    }

    /// Sampled validators active at `epoch`.
    pub fn active_indices(&self, epoch: u64) -> Vec<u64> {
        self.validators
            .iter()
            .filter(|v| v.is_active_at(epoch))
            .map(|v| v.index)
            .collect()
    }

    pub fn resolver(&self) -> CredentialResolver {
        CredentialResolver::new(
            self.validators
                .iter()
                .map(|v| (v.index, v.entity.clone()))
                .collect(),
        )
    }

    pub fn sample_weights(&self) -> SampleWeights {
        SampleWeights::new(
            self.weights
                .iter()
                .map(|(index, weight)| (SubjectId::Validator(*index), *weight))
                .collect(),
        )
    }

    /// Number of validators the weighted sample represents.
    pub fn represented(&self) -> f64 {
        self.validators
            .iter()
            .map(|v| self.weights.get(&v.index).copied().unwrap_or(1.0))
            .sum()
    }
}

impl ValidatorRegistry {
    /// Parses `{"validators": [{"index", "withdrawal_credentials", "state"}, ..]}`.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let file: RegistryFile = serde_json::from_str(raw)?;
        let mut validators: Vec<Validator> = file
            .validators
            .into_iter()
            .map(|entry| Validator {
                index: entry.index,
                entity: resolve_withdrawal_credential(&entry.withdrawal_credentials, entry.index),
                state: entry.state,
                activation_epoch: entry.activation_epoch,
                exit_epoch: entry.exit_epoch,
            })
            .collect();
        validators.sort_by_key(|v| v.index);
        validators.dedup_by_key(|v| v.index);
        Ok(Self { validators })
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn entity_count(&self) -> usize {
        self.by_entity().len()
    }

    /// Active validators per entity at `epoch`, over the whole registry.
    pub fn active_counts(&self, epoch: u64) -> BTreeMap<EntityKey, u32> {
        let mut counts = BTreeMap::new();
        for validator in self.validators.iter().filter(|v| v.is_active_at(epoch)) {
            *counts.entry(validator.entity.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn by_entity(&self) -> BTreeMap<&EntityKey, Vec<&Validator>> {
        let mut groups: BTreeMap<&EntityKey, Vec<&Validator>> = BTreeMap::new();
        for validator in &self.validators {
            groups.entry(&validator.entity).or_default().push(validator);
        }
        groups
    }

    /// Every validator at weight 1.
    pub fn full(&self) -> ValidatorSample {
        ValidatorSample {
            validators: self.validators.clone(),
            weights: self.validators.iter().map(|v| (v.index, 1.0)).collect(),
        }
    }

    /// Keeps the `top_entities` largest entities whole and samples at most
    /// `tail_per_entity` validators from every other entity.
    ///
    /// A tail validator's weight is the entity's validator count over the
    /// number sampled, so weighted sums estimate population totals.
    pub fn sample(&self, top_entities: usize, tail_per_entity: usize, seed: u64) -> ValidatorSample {
        let mut groups: Vec<(&EntityKey, Vec<&Validator>)> = self.by_entity().into_iter().collect();
        // largest first, key order among equals keeps the cut deterministic
        groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

        let mut rng = StdRng::seed_from_u64(seed);
        let mut sample = ValidatorSample::default();
        for (rank, (entity, members)) in groups.into_iter().enumerate() {
            let total = members.len();
            let chosen: Vec<&Validator> = if rank < top_entities || total <= tail_per_entity.max(1) {
                members
            } else {
                members
                    .choose_multiple(&mut rng, tail_per_entity.max(1))
                    .copied()
                    .collect()
            };
            let weight = total as f64 / chosen.len() as f64;
            tracing::debug!("entity {}: kept {} of {} validators", entity, chosen.len(), total);
            for validator in chosen {
                sample.weights.insert(validator.index, weight);
                sample.validators.push(validator.clone());
            }
        }
        sample.validators.sort_by_key(|v| v.index);

        tracing::info!(
            "sampled {} of {} validators ({} entities, {:.0} represented)",
            sample.validators.len(),
            self.validators.len(),
            self.entity_count(),
            sample.represented()
        );
        sample
    }
}
