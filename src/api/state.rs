use clickhouse::Client;

/// Shared handler state: the ClickHouse connection holding collected output.
pub type AppState = Client;
