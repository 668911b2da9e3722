use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use super::{integer, normalize_items, opt_integer, opt_timestamp, ShapeError, SourceWindow};
use crate::services::client::{ApiClient, RetryPolicy};
use crate::types::models::{RawRecord, RecordValues, SubjectId};

/// Beacon chain genesis, 2020-12-01T12:00:23Z.
pub const GENESIS_UNIX: i64 = 1_606_824_023;
/// 32 slots of 12 seconds.
pub const SECONDS_PER_EPOCH: i64 = 384;
pub const MAX_BATCH: usize = 100;

pub fn genesis() -> DateTime<Utc> {
    Utc.timestamp_opt(GENESIS_UNIX, 0).single().unwrap_or_default()
}

/// Epoch containing `ts`; instants before genesis map to epoch 0.
pub fn epoch_at(ts: DateTime<Utc>) -> u64 {
    let delta = ts.timestamp() - GENESIS_UNIX;
    if delta < 0 {
        0
    } else {
        (delta / SECONDS_PER_EPOCH) as u64
    }
}

/// Normalizes one balance history row. The epoch is the ordering key.
pub fn normalize_balance(obj: &Map<String, Value>) -> Result<RawRecord, ShapeError> {
    let index = integer(obj, "validatorindex")?;
    let epoch = integer(obj, "epoch")?;
    Ok(RawRecord {
        subject: SubjectId::Validator(index),
        block: Some(epoch),
        timestamp: opt_timestamp(obj, "week_end"),
        values: RecordValues::Beacon {
            balance: integer(obj, "balance")?,
            effective_balance: integer(obj, "effectivebalance")?,
            epoch,
            week: opt_integer(obj, "week")?,
            week_end: opt_timestamp(obj, "week_end"),
        },
    })
}

fn batch_endpoint(indices: &[u64]) -> String {
    let ids: Vec<String> = indices.iter().map(u64::to_string).collect();
    format!("/validator/{}/balancehistory", ids.join(","))
}

/// Balance snapshot of `indices` at `latest_epoch`, fetched in batches.
///
/// The first failing batch aborts the window; batches already fetched are kept.
pub async fn fetch_balance_window(
    client: &ApiClient,
    retry: &RetryPolicy,
    indices: &[u64],
    latest_epoch: u64,
    batch_size: usize,
) -> SourceWindow {
    let batch_size = batch_size.clamp(1, MAX_BATCH);
    let params = vec![
        ("latest_epoch", latest_epoch.to_string()),
        ("limit", "1".to_string()),
        ("offset", "0".to_string()),
    ];

    let mut window = SourceWindow::default();
    for batch in indices.chunks(batch_size) {
        let endpoint = batch_endpoint(batch);
        match client.call_with_retry(&endpoint, &params, retry).await {
            Ok(body) => {
                window.pages += 1;
                let items = match body.get("data") {
                    Some(Value::Array(items)) => items.as_slice(),
                    _ => &[],
                };
                let (records, skipped) = normalize_items("beacon", items, normalize_balance);
                window.records.extend(records);
                window.skipped += skipped;
            }
            Err(e) => {
                tracing::warn!(
                    "balance history at epoch {} aborted after {} batches: {}",
                    latest_epoch,
                    window.pages,
                    e
                );
                window.error = Some(e);
                break;
            }
        }
    }
    window
}
