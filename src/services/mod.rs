pub mod aggregator;
pub mod client;
pub mod collector;
pub mod dedup;
pub mod paginator;
pub mod registry;
pub mod resolver;
pub mod schedule;
pub mod sources;
pub mod stats;
pub mod throttle;
