use clickhouse::Client;
use anyhow::Result;
use crate::db::models::{EntityPeriodRecord, InequalityRecord, WindowReportRecord};

pub async fn get_inequality_series(
    client: &Client,
    dataset: &str,
    metric: Option<&str>,
) -> Result<Vec<InequalityRecord>> {
    let query = "
        SELECT ?fields
        FROM inequality_points FINAL
        WHERE dataset = ? AND (? = '' OR metric = ?)
        ORDER BY metric, period_index
    ";
    let metric = metric.unwrap_or_default();

    let mut cursor = client
        .query(query)
        .bind(dataset)
        .bind(metric)
        .bind(metric)
        .fetch::<InequalityRecord>()?;
    let mut results = Vec::new();

    while let Some(row) = cursor.next().await? {
        results.push(row);
    }

    Ok(results)
}

pub async fn get_entity_summaries(
    client: &Client,
    dataset: &str,
    period_index: u32,
) -> Result<Vec<EntityPeriodRecord>> {
    let rows = client
        .query(
            "SELECT ?fields
            FROM entity_period_summaries FINAL
            WHERE dataset = ? AND period_index = ?
            ORDER BY stake_share DESC"
        )
        .bind(dataset)
        .bind(period_index)
        .fetch_all::<EntityPeriodRecord>()
        .await?;

    Ok(rows)
}

pub async fn get_window_reports(client: &Client, dataset: &str) -> Result<Vec<WindowReportRecord>> {
    let rows = client
        .query(
            "SELECT ?fields
            FROM window_reports FINAL
            WHERE dataset = ?
            ORDER BY period_index"
        )
        .bind(dataset)
        .fetch_all::<WindowReportRecord>()
        .await?;

    Ok(rows)
}
