use std::collections::HashMap;

use crate::types::models::{EntityKey, RawRecord, RecordValues, SubjectId};

pub const CREDENTIAL_LEN: usize = 32;
const ADDRESS_LEN: usize = 20;

/// Maps a subject's record to the economic owner behind it.
///
/// Total: every record maps to exactly one key. Subjects whose owner cannot be
/// recovered get a synthetic `legacy_` key unique to the subject.
pub trait EntityResolver {
    fn resolve(&self, record: &RawRecord) -> EntityKey;
}

/// Entity key of a 32-byte withdrawal credential.
///
/// Type 0x01 and 0x02 credentials pay out to the address in the last 20 bytes.
/// Any other type (including BLS 0x00) cannot be traced to an address.
pub fn credential_to_entity(credential: &[u8], fallback_index: u64) -> EntityKey {
    match credential.first() {
        Some(1) | Some(2) if credential.len() == CREDENTIAL_LEN => {
            let address = &credential[CREDENTIAL_LEN - ADDRESS_LEN..];
            EntityKey::new(format!("0x{}", hex::encode(address)))
        }
        _ => EntityKey::legacy(fallback_index),
    }
}

/// Same as [`credential_to_entity`] for the `0x`-prefixed hex form.
pub fn resolve_withdrawal_credential(credential_hex: &str, fallback_index: u64) -> EntityKey {
    let digits = credential_hex
        .strip_prefix("0x")
        .or_else(|| credential_hex.strip_prefix("0X"))
        .unwrap_or(credential_hex);
    match hex::decode(digits) {
        Ok(bytes) => credential_to_entity(&bytes, fallback_index),
        Err(e) => {
            tracing::warn!("validator {}: undecodable withdrawal credential ({})", fallback_index, e);
            EntityKey::legacy(fallback_index)
        }
    }
}

/// Resolves validator indices through a registry of decoded credentials.
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    entities: HashMap<u64, EntityKey>,
}

impl CredentialResolver {
    pub fn new(entities: HashMap<u64, EntityKey>) -> Self {
        Self { entities }
    }

    pub fn insert(&mut self, index: u64, credential_hex: &str) -> &EntityKey {
        let key = resolve_withdrawal_credential(credential_hex, index);
        self.entities.entry(index).or_insert(key)
    }

    pub fn entity_of(&self, index: u64) -> EntityKey {
        self.entities
            .get(&index)
            .cloned()
            .unwrap_or_else(|| EntityKey::legacy(index))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityResolver for CredentialResolver {
    fn resolve(&self, record: &RawRecord) -> EntityKey {
        match &record.subject {
            SubjectId::Validator(index) => self.entity_of(*index),
            SubjectId::Hotkey(hotkey) => EntityKey::legacy(hotkey),
        }
    }
}

/// Subnet identity: the coldkey already names the economic owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColdkeyResolver;

impl EntityResolver for ColdkeyResolver {
    fn resolve(&self, record: &RawRecord) -> EntityKey {
        match &record.values {
            RecordValues::Subnet { coldkey: Some(coldkey), .. } if !coldkey.is_empty() => {
                EntityKey::new(coldkey.clone())
            }
            _ => EntityKey::legacy(&record.subject),
        }
    }
}
