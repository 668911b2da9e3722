use anyhow::Result;
use clickhouse::Client;
use crate::db::schema::{ENTITY_PERIOD_SUMMARIES_SQL, INEQUALITY_POINTS_SQL, WINDOW_REPORTS_SQL};

pub async fn init_database(client: &Client) -> Result<()> {
    tracing::info!("Initializing database tables...");

    // Create tables if they don't exist (won't drop existing data)
    client.query(ENTITY_PERIOD_SUMMARIES_SQL).execute().await?;
    client.query(INEQUALITY_POINTS_SQL).execute().await?;
    client.query(WINDOW_REPORTS_SQL).execute().await?;

    Ok(())
}
