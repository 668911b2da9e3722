use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Result;
use dotenv::dotenv;
use clickhouse::Client;
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};

use stakespread::api::routes::create_router;
use stakespread::config::{CollectorConfig, SourceEndpoint};
use stakespread::db::init::init_database;
use stakespread::db::sink::ClickHouseSink;
use stakespread::services::client::{ApiClient, Auth};
use stakespread::services::collector::Collector;

async fn connect_to_clickhouse(clickhouse_url: &str, max_retries: u32) -> Result<Client> {
    let client = Client::default()
        .with_url(clickhouse_url)
        .with_database("default");

    let mut attempt = 1;
    loop {
        match client.query("SELECT 1").execute().await {
            Ok(_) => {
                tracing::info!("Connected to ClickHouse at {}", clickhouse_url);
                return Ok(client);
            }
            Err(e) => {
                if attempt >= max_retries {
                    return Err(anyhow::anyhow!("Failed to connect to ClickHouse after {} attempts: {}", max_retries, e));
                }
                tracing::warn!("Failed to connect to ClickHouse (attempt {}/{}): {}", attempt, max_retries, e);
                sleep(Duration::from_secs(2)).await;
                attempt += 1;
            }
        }
    }
}

fn source_client(endpoint: &SourceEndpoint, auth: Auth, config: &CollectorConfig) -> Result<ApiClient> {
    Ok(ApiClient::new(&endpoint.base_url, auth, config.rpm_limit)?)
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    dotenv().ok();
    let config = CollectorConfig::from_env()?;

    // Connect to ClickHouse with retries
    let client = connect_to_clickhouse(&config.clickhouse_url, 5).await?;

    // Initialize database tables
    init_database(&client).await?;

    let taostats_auth = match &config.taostats.api_key {
        Some(key) => Auth::Header { name: "Authorization".to_string(), value: key.clone() },
        None => {
            tracing::warn!("TAOSTATS_API_KEY not set, requests go out unauthenticated");
            Auth::None
        }
    };
    let beacon_auth = match &config.beacon.api_key {
        Some(key) => Auth::Query { name: "apikey".to_string(), value: key.clone() },
        None => Auth::None,
    };
    let taostats = source_client(&config.taostats, taostats_auth, &config)?;
    let beacon = source_client(&config.beacon, beacon_auth, &config)?;

    let app = create_router(client.clone());
    let addr: SocketAddr = config.api_addr.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    // Run the collection in a separate task; the API keeps serving afterwards
    let collector = Collector::new(config, Arc::new(ClickHouseSink::new(client.clone())));
    let collector_handle = tokio::spawn(async move {
        tracing::info!("Starting collection run...");
        if let Err(e) = collector.run(Some(&taostats), Some(&beacon)).await {
            tracing::error!("Collection run failed: {:?}", e);
        }
    });

    let server = axum::serve(listener, app.into_make_service()).into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            if let Err(e) = result {
                tracing::error!("Failed to serve API: {:?}", e);
            }
            return Ok(());
        }
        _ = collector_handle => {
            tracing::info!("Collection service finished");
        }
    }

    if let Err(e) = server.await {
        tracing::error!("Failed to serve API: {:?}", e);
    }

    Ok(())
}
