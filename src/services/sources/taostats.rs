use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{integer, normalize_items, number, opt_integer, opt_number, opt_timestamp, ShapeError, SourceWindow};
use crate::services::client::SourceError;
use crate::services::paginator::Paginator;
use crate::types::models::{RawRecord, RecordValues, SubjectId};

pub const METAGRAPH_HISTORY: &str = "/metagraph/history/v1";
pub const POOL_HISTORY: &str = "/dtao/pool/history/v1";

pub const RAO_PER_TAO: f64 = 1e9;
pub const BLOCKS_PER_DAY: f64 = 7_200.0;
/// Price of a subnet token before its pool existed.
pub const DEFAULT_ALPHA_PRICE: f64 = 1.0;

/// Keys arrive either as a bare string or as `{"ss58": .., "hex": ..}`.
fn key_field(obj: &Map<String, Value>, field: &str) -> Option<String> {
    match obj.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(inner) => inner
            .get("ss58")
            .or_else(|| inner.get("hex"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Normalizes one metagraph history row.
///
/// Stake is `alpha_stake + root_stake_as_alpha`, falling back to the legacy
/// `stake` field when that sum is zero. The reward rate is `daily_reward`, or
/// the per-block `emission` scaled to a day. Both are converted from rao and
/// valued at `alpha_price`.
pub fn normalize_neuron(obj: &Map<String, Value>, netuid: u16, alpha_price: f64) -> Result<RawRecord, ShapeError> {
    let hotkey = key_field(obj, "hotkey").ok_or(ShapeError::Missing("hotkey"))?;
    let coldkey = key_field(obj, "coldkey");

    let alpha = opt_number(obj, "alpha_stake")?;
    let root_as_alpha = opt_number(obj, "root_stake_as_alpha")?;
    let legacy = opt_number(obj, "stake")?;
    let stake_rao = match (alpha, root_as_alpha, legacy) {
        (None, None, None) => return Err(ShapeError::Missing("stake")),
        (a, r, l) => {
            let dtao = a.unwrap_or(0.0) + r.unwrap_or(0.0);
            match l {
                Some(l) if dtao == 0.0 && l > 0.0 => l,
                _ => dtao,
            }
        }
    };

    let reward_rao = match opt_number(obj, "daily_reward")? {
        Some(daily) => daily,
        None => number(obj, "emission")? * BLOCKS_PER_DAY,
    };

    Ok(RawRecord {
        subject: SubjectId::Hotkey(hotkey),
        block: opt_integer(obj, "block_number")?,
        timestamp: opt_timestamp(obj, "timestamp"),
        values: RecordValues::Subnet {
            netuid,
            uid: opt_integer(obj, "uid")?,
            coldkey,
            stake: stake_rao / RAO_PER_TAO * alpha_price,
            emission: reward_rao / RAO_PER_TAO * alpha_price,
            incentive: opt_number(obj, "incentive")?.unwrap_or(0.0),
            consensus: opt_number(obj, "consensus")?.unwrap_or(0.0),
            trust: opt_number(obj, "trust")?.unwrap_or(0.0),
            active: obj.get("active").and_then(Value::as_bool).unwrap_or(true),
        },
    })
}

/// Latest pool price per subnet among the given history rows.
///
/// Later blocks win; rows without a block keep the last one seen.
pub fn latest_prices(items: &[Value]) -> HashMap<u16, f64> {
    let mut latest: HashMap<u16, (Option<u64>, f64)> = HashMap::new();
    for item in items {
        let Value::Object(obj) = item else { continue };
        let parsed = integer(obj, "netuid").and_then(|netuid| {
            let price = number(obj, "price")?;
            Ok((netuid, opt_integer(obj, "block_number")?, price))
        });
        let (netuid, block, price) = match parsed {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("pool history: skipping price row: {}", e);
                continue;
            }
        };
        let Ok(netuid) = u16::try_from(netuid) else { continue };
        match latest.get(&netuid) {
            Some((seen, _)) if block < *seen => {}
            _ => {
                latest.insert(netuid, (block, price));
            }
        }
    }
    latest.into_iter().map(|(netuid, (_, price))| (netuid, price)).collect()
}

fn window_params(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(&'static str, String)> {
    vec![
        ("timestamp_start", start.timestamp().to_string()),
        ("timestamp_end", end.timestamp().to_string()),
    ]
}

/// Pool prices of one window and the error that cut the fetch short, if any.
#[derive(Debug, Default)]
pub struct PriceTable {
    pub prices: HashMap<u16, f64>,
    pub error: Option<SourceError>,
}

impl PriceTable {
    /// Price of `netuid`, or the default price when the pool has no row.
    pub fn price_of(&self, netuid: u16) -> f64 {
        self.prices.get(&netuid).copied().unwrap_or(DEFAULT_ALPHA_PRICE)
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Pool prices of all subnets within `[start, end]`.
///
/// A failed fetch keeps the rows that arrived; callers must flag windows
/// valued with an incomplete table.
pub async fn fetch_prices(paginator: &Paginator<'_>, start: DateTime<Utc>, end: DateTime<Utc>) -> PriceTable {
    let fetch = paginator.collect(POOL_HISTORY, window_params(start, end)).await;
    if let Some(e) = &fetch.error {
        tracing::warn!("pool prices for {} incomplete: {}", start.format("%Y-%m-%d"), e);
    }
    PriceTable {
        prices: latest_prices(&fetch.items),
        error: fetch.error,
    }
}

/// All metagraph rows of one subnet within `[start, end]`, newest first.
pub async fn fetch_subnet_window(
    paginator: &Paginator<'_>,
    netuid: u16,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    alpha_price: f64,
) -> SourceWindow {
    let mut params = vec![("netuid", netuid.to_string())];
    params.extend(window_params(start, end));
    params.push(("order", "timestamp_desc".to_string()));

    let fetch = paginator.collect(METAGRAPH_HISTORY, params).await;
    let label = format!("SN{}", netuid);
    let (records, skipped) = normalize_items(&label, &fetch.items, |obj| normalize_neuron(obj, netuid, alpha_price));

    SourceWindow {
        records,
        pages: fetch.pages,
        skipped,
        error: fetch.error,
    }
}
