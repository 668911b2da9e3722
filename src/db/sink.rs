use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use clickhouse::Client;

use crate::db::operations::{insert_inequality_points, insert_window};
use crate::types::models::{EntityPeriodSummary, InequalityPoint, WindowReport};

/// Destination of collection output. Called once per finished window, so
/// progress survives an interrupted run.
#[async_trait]
pub trait RunSink: Send + Sync {
    async fn write_window(&self, report: &WindowReport, summaries: &[EntityPeriodSummary]) -> Result<()>;

    async fn write_inequality(&self, points: &[InequalityPoint]) -> Result<()>;
}

pub struct ClickHouseSink {
    client: Client,
}

impl ClickHouseSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RunSink for ClickHouseSink {
    async fn write_window(&self, report: &WindowReport, summaries: &[EntityPeriodSummary]) -> Result<()> {
        insert_window(&self.client, report, summaries).await
    }

    async fn write_inequality(&self, points: &[InequalityPoint]) -> Result<()> {
        insert_inequality_points(&self.client, points).await
    }
}

/// Keeps everything in memory.
#[derive(Default)]
pub struct MemorySink {
    pub reports: Mutex<Vec<WindowReport>>,
    pub summaries: Mutex<Vec<EntityPeriodSummary>>,
    pub points: Mutex<Vec<InequalityPoint>>,
}

#[async_trait]
impl RunSink for MemorySink {
    async fn write_window(&self, report: &WindowReport, summaries: &[EntityPeriodSummary]) -> Result<()> {
        self.reports
            .lock()
            .map_err(|_| anyhow::anyhow!("report store poisoned"))?
            .push(report.clone());
        self.summaries
            .lock()
            .map_err(|_| anyhow::anyhow!("summary store poisoned"))?
            .extend_from_slice(summaries);
        Ok(())
    }

    async fn write_inequality(&self, points: &[InequalityPoint]) -> Result<()> {
        self.points
            .lock()
            .map_err(|_| anyhow::anyhow!("point store poisoned"))?
            .extend_from_slice(points);
        Ok(())
    }
}
