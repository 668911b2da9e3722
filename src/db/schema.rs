pub const ENTITY_PERIOD_SUMMARIES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS entity_period_summaries (
    dataset String,
    period_index UInt32,
    period_start DateTime('UTC'),
    period_end DateTime('UTC'),
    entity String,
    subjects UInt32,
    stake_total Float64,
    reward_total Float64,
    stake_share Float64,
    reward_share Float64,
    inserted_at DateTime('UTC') DEFAULT now('UTC')
) ENGINE = ReplacingMergeTree(inserted_at)
ORDER BY (dataset, period_index, entity)
"#;

pub const INEQUALITY_POINTS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS inequality_points (
    dataset String,
    period_index UInt32,
    period_start DateTime('UTC'),
    metric LowCardinality(String),
    gini Float64,
    nakamoto UInt32,
    participants UInt32,
    total_value Float64,
    top_share Float64,
    inserted_at DateTime('UTC') DEFAULT now('UTC')
) ENGINE = ReplacingMergeTree(inserted_at)
ORDER BY (dataset, metric, period_index)
"#;

pub const WINDOW_REPORTS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS window_reports (
    dataset String,
    period_index UInt32,
    period_start DateTime('UTC'),
    pages UInt32,
    records UInt32,
    skipped_records UInt32,
    identity_gaps UInt32,
    complete Bool,
    error String,
    inserted_at DateTime('UTC') DEFAULT now('UTC')
) ENGINE = ReplacingMergeTree(inserted_at)
ORDER BY (dataset, period_index)
"#;
