use anyhow::Result;
use clickhouse::Client;
use crate::db::models::{EntityPeriodRecord, InequalityRecord, WindowReportRecord};
use crate::types::models::{EntityPeriodSummary, InequalityPoint, WindowReport};

/// Writes one finished window: its report and its entity rows.
pub async fn insert_window(client: &Client, report: &WindowReport, summaries: &[EntityPeriodSummary]) -> Result<()> {
    tracing::debug!(
        "Inserting window: dataset={}, period={}, rows={}",
        report.dataset, report.period.index, summaries.len()
    );

    if !summaries.is_empty() {
        let mut insert = client.insert("entity_period_summaries")?;
        for summary in summaries {
            insert.write(&EntityPeriodRecord::from(summary)).await?;
        }
        insert.end().await?;
    }

    let mut insert = client.insert("window_reports")?;
    insert.write(&WindowReportRecord::from(report)).await?;
    insert.end().await?;

    Ok(())
}

pub async fn insert_inequality_points(client: &Client, points: &[InequalityPoint]) -> Result<()> {
    if points.is_empty() {
        return Ok(());
    }

    let mut insert = client.insert("inequality_points")?;
    for point in points {
        insert.write(&InequalityRecord::from(point)).await?;
    }
    insert.end().await?;

    Ok(())
}
