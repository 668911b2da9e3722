//! Collection runs: fetch every window, reduce it to entity rows, persist it,
//! then measure inequality over the finished series.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

use super::aggregator::{accumulate, aggregate_delta, BalanceBook, PeriodAccumulator, SampleWeights};
use super::client::{ApiClient, RetryPolicy};
use super::dedup::deduplicate;
use super::paginator::Paginator;
use super::registry::{ValidatorRegistry, ValidatorSample};
use super::resolver::{ColdkeyResolver, EntityResolver};
use super::schedule::{lookback, schedule};
use super::sources::beacon::{epoch_at, fetch_balance_window};
use super::sources::taostats::{fetch_prices, fetch_subnet_window};
use super::sources::SourceWindow;
use super::stats::{incentive_point, inequality_series, validator_count_point, InequalityOptions};
use crate::config::CollectorConfig;
use crate::db::sink::RunSink;
use crate::types::models::{EntityPeriodSummary, InequalityPoint, Period, Snapshot, WindowReport};

pub const BEACON_DATASET: &str = "eth";

/// Coldkeys summed across every configured subnet.
pub const COMBINED_SUBNET_DATASET: &str = "tao-all";

pub fn subnet_dataset(netuid: u16) -> String {
    format!("tao-sn{}", netuid)
}

type Series = Vec<(Period, Vec<EntityPeriodSummary>)>;

pub struct Collector {
    config: CollectorConfig,
    sink: Arc<dyn RunSink>,
    failed_writes: AtomicU32,
}

impl Collector {
    pub fn new(config: CollectorConfig, sink: Arc<dyn RunSink>) -> Self {
        Self {
            config,
            sink,
            failed_writes: AtomicU32::new(0),
        }
    }

    pub fn periods(&self) -> Vec<Period> {
        schedule(self.config.start, self.config.end, self.config.cadence_days)
    }

    /// Sink writes that failed since this collector was built.
    pub fn failed_writes(&self) -> u32 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            delay: self.config.retry_delay,
            incrementing: true,
        }
    }

    fn inequality_options(&self) -> InequalityOptions {
        InequalityOptions {
            threshold: self.config.nakamoto_threshold,
            skip_zero: self.config.skip_zero_participants,
        }
    }

    /// Runs every configured source over the whole schedule.
    pub async fn run(&self, taostats: Option<&ApiClient>, beacon: Option<&ApiClient>) -> Result<Vec<InequalityPoint>> {
        let periods = self.periods();
        tracing::info!(
            "Collecting {} periods from {} to {}",
            periods.len(),
            self.config.start.format("%Y-%m-%d"),
            self.config.end.format("%Y-%m-%d")
        );

        let mut points = Vec::new();
        if let Some(client) = taostats {
            if !self.config.subnets.is_empty() {
                points.extend(self.run_subnets(client, &periods).await?);
            }
        }
        if let Some(client) = beacon {
            match self.load_registry().await {
                Ok(Some(registry)) => points.extend(self.run_beacon(client, &registry, &periods).await?),
                Ok(None) => tracing::info!("No validator registry configured, skipping beacon collection"),
                Err(e) => tracing::error!("Skipping beacon collection: {:#}", e),
            }
        }

        let failed = self.failed_writes();
        if failed > 0 {
            tracing::warn!("Collection finished with {} failed writes", failed);
        }
        tracing::info!("Collection finished with {} inequality points", points.len());
        Ok(points)
    }

    /// Reads the validator registry, if one is configured.
    pub async fn load_registry(&self) -> Result<Option<ValidatorRegistry>> {
        let Some(path) = &self.config.validators_file else {
            return Ok(None);
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading validator registry {}", path))?;
        let registry = ValidatorRegistry::from_json(&raw)
            .with_context(|| format!("parsing validator registry {}", path))?;
        tracing::info!(
            "Loaded {} validators owned by {} entities",
            registry.len(),
            registry.entity_count()
        );
        Ok(Some(registry))
    }

    /// The configured sample of `registry`, or all of it.
    pub fn draw_sample(&self, registry: &ValidatorRegistry) -> ValidatorSample {
        let sample = &self.config.sample;
        if sample.enabled {
            registry.sample(sample.top_entities, sample.tail_per_entity, sample.seed)
        } else {
            registry.full()
        }
    }

    /// Level metrics for every configured subnet, one lookback window per
    /// period. With more than one subnet, coldkeys are also summed across
    /// subnets into the combined dataset.
    pub async fn run_subnets(&self, client: &ApiClient, periods: &[Period]) -> Result<Vec<InequalityPoint>> {
        let paginator = Paginator::new(client, self.retry_policy(), self.config.page_guard, self.config.page_size);
        let weights = SampleWeights::default();
        let threshold = self.config.nakamoto_threshold;
        let combine = self.config.subnets.len() > 1;

        let mut series: BTreeMap<u16, Series> = BTreeMap::new();
        let mut incentives: BTreeMap<u16, Vec<InequalityPoint>> = BTreeMap::new();
        let mut combined_series = Series::new();

        for period in periods {
            let (from, to) = lookback(period, self.config.lookback_hours);
            let prices = fetch_prices(&paginator, from, to).await;
            let mut combined = PeriodAccumulator::default();
            let mut combined_report = WindowReport::new(COMBINED_SUBNET_DATASET, *period);

            for &netuid in &self.config.subnets {
                let dataset = subnet_dataset(netuid);
                let mut window = fetch_subnet_window(&paginator, netuid, from, to, prices.price_of(netuid)).await;

                let snapshot = deduplicate(std::mem::take(&mut window.records));
                let mut report = window_report(&dataset, *period, &window, &snapshot, &ColdkeyResolver);
                if let Some(e) = &prices.error {
                    report.mark_gap(format!("pool prices incomplete: {}", e));
                }

                let acc = accumulate(&snapshot, &ColdkeyResolver, &weights);
                if combine {
                    combined.merge(acc.clone());
                    combined_report.absorb(&report);
                }
                let rows = acc.finalize(&dataset, *period);
                self.persist_window(&report, &rows).await;

                if !snapshot.is_empty() {
                    incentives
                        .entry(netuid)
                        .or_default()
                        .push(incentive_point(&dataset, *period, &snapshot, threshold));
                }
                series.entry(netuid).or_default().push((*period, rows));
            }

            if combine {
                let rows = combined.finalize(COMBINED_SUBNET_DATASET, *period);
                self.persist_window(&combined_report, &rows).await;
                combined_series.push((*period, rows));
            }
        }

        let mut points = Vec::new();
        for (netuid, periods) in series {
            let extra = incentives.remove(&netuid).unwrap_or_default();
            points.extend(self.finish_series(&subnet_dataset(netuid), periods, extra).await);
        }
        if combine {
            points.extend(
                self.finish_series(COMBINED_SUBNET_DATASET, combined_series, Vec::new())
                    .await,
            );
        }
        Ok(points)
    }

    /// Stake levels and issuance flows for the sampled validators, one
    /// balance snapshot per period anchor, plus the spread of active
    /// validator counts over the whole registry.
    pub async fn run_beacon(
        &self,
        client: &ApiClient,
        registry: &ValidatorRegistry,
        periods: &[Period],
    ) -> Result<Vec<InequalityPoint>> {
        let retry = self.retry_policy();
        let sample = self.draw_sample(registry);
        let resolver = sample.resolver();
        let weights = sample.sample_weights();
        let threshold = self.config.nakamoto_threshold;

        let mut book = BalanceBook::default();
        let mut series = Series::new();
        let mut counts = Vec::new();
        for period in periods {
            let epoch = epoch_at(period.start);
            let indices = sample.active_indices(epoch);
            tracing::info!(
                "{} period {}: epoch {}, {} active sampled validators",
                BEACON_DATASET,
                period.label(),
                epoch,
                indices.len()
            );

            let active = registry.active_counts(epoch);
            if !active.is_empty() {
                counts.push(validator_count_point(BEACON_DATASET, *period, &active, threshold));
            }

            let mut window =
                fetch_balance_window(client, &retry, &indices, epoch, self.config.beacon_batch).await;
            let snapshot = deduplicate(std::mem::take(&mut window.records));
            let report = window_report(BEACON_DATASET, *period, &window, &snapshot, &resolver);
            let (rows, next) = aggregate_delta(
                book,
                BEACON_DATASET,
                *period,
                &snapshot,
                &resolver,
                &weights,
                self.config.negative_flow,
            )?;
            book = next;

            self.persist_window(&report, &rows).await;
            series.push((*period, rows));
        }

        Ok(self.finish_series(BEACON_DATASET, series, counts).await)
    }

    /// Writes one window. A failed write is logged and counted; the rows
    /// stay in memory so inequality is still measured over them.
    async fn persist_window(&self, report: &WindowReport, rows: &[EntityPeriodSummary]) {
        if let Err(e) = self.sink.write_window(report, rows).await {
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                "persisting {} period {} failed: {:#}",
                report.dataset,
                report.period.index,
                e
            );
        }
    }

    async fn finish_series(&self, dataset: &str, series: Series, extra: Vec<InequalityPoint>) -> Vec<InequalityPoint> {
        // a window that yielded nothing has no distribution to measure; its
        // report already carries the gap
        let measured: Series = series.into_iter().filter(|(_, rows)| !rows.is_empty()).collect();
        let mut points = inequality_series(dataset, &measured, &self.inequality_options());
        points.extend(extra);

        if let Err(e) = self.sink.write_inequality(&points).await {
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
            tracing::error!("persisting inequality for {} failed: {:#}", dataset, e);
        }
        tracing::info!("{}: {} inequality points over {} periods", dataset, points.len(), measured.len());
        points
    }
}

/// Report for one fetched window. Logs the gap when fetching aborted.
fn window_report<R: EntityResolver + ?Sized>(
    dataset: &str,
    period: Period,
    window: &SourceWindow,
    snapshot: &Snapshot,
    resolver: &R,
) -> WindowReport {
    let mut report = WindowReport::new(dataset, period);
    report.pages = window.pages;
    report.records = snapshot.len() as u32;
    report.skipped_records = window.skipped;
    report.identity_gaps = snapshot
        .records()
        .filter(|record| resolver.resolve(record).is_synthetic())
        .count() as u32;

    if let Some(e) = &window.error {
        tracing::error!(
            "{} period {} ({}) incomplete after {} pages: {}",
            dataset,
            period.index,
            period.label(),
            window.pages,
            e
        );
        report.mark_gap(e.to_string());
    } else {
        tracing::info!(
            "{} period {} ({}): {} subjects, {} skipped, {} identity gaps",
            dataset,
            period.index,
            period.label(),
            report.records,
            report.skipped_records,
            report.identity_gaps
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sink::MemorySink;
    use crate::services::client::Auth;
    use crate::types::models::Metric;
    use async_trait::async_trait;
    use nonzero_ext::nonzero;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use wiremock::matchers::{path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(pairs: &[(&str, &str)]) -> CollectorConfig {
        let mut vars: HashMap<String, String> = [
            ("STAKESPREAD_START_DATE", "2025-02-13"),
            ("STAKESPREAD_END_DATE", "2025-02-20"),
            ("STAKESPREAD_RPM_LIMIT", "60000"),
            ("STAKESPREAD_PAGE_GUARD_MS", "0"),
            ("STAKESPREAD_MAX_RETRIES", "0"),
            ("STAKESPREAD_RETRY_DELAY_MS", "1"),
            ("STAKESPREAD_SUBNETS", "64"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            vars.insert(k.to_string(), v.to_string());
        }
        CollectorConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.uri(), Auth::None, nonzero!(60_000u32)).unwrap()
    }

    fn neuron(hotkey: &str, coldkey: Option<&str>, block: u64, alpha_stake: u64) -> Value {
        json!({
            "hotkey": {"ss58": hotkey},
            "coldkey": coldkey.map(|c| json!({"ss58": c})),
            "block_number": block,
            "alpha_stake": alpha_stake,
            "daily_reward": alpha_stake / 100,
            "incentive": 0.1,
        })
    }

    async fn mount_prices(server: &MockServer) {
        Mock::given(path("/dtao/pool/history/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"netuid": 64, "price": "2.0", "block_number": 10}],
                "pagination": {"next_page": null}
            })))
            .mount(server)
            .await;
    }

    async fn mount_metagraph(server: &MockServer, netuid: &str, data: Value) {
        Mock::given(path("/metagraph/history/v1"))
            .and(query_param("netuid", netuid))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": data,
                "pagination": {"next_page": null}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_subnet_run_persists_every_window() {
        let server = MockServer::start().await;
        mount_prices(&server).await;
        Mock::given(path("/metagraph/history/v1"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    neuron("h1", Some("c1"), 100, 1_000_000_000),
                    neuron("h1", Some("c1"), 105, 3_000_000_000u64),
                    neuron("h2", Some("c1"), 105, 1_000_000_000),
                    neuron("h3", None, 105, 4_000_000_000u64),
                    {"coldkey": "c9", "alpha_stake": 5}
                ],
                "pagination": {"next_page": null}
            })))
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let collector = Collector::new(config(&[]), sink.clone());
        let client = client(&server);
        let points = collector.run(Some(&client), None).await.unwrap();

        let reports = sink.reports.lock().unwrap().clone();
        assert_eq!(reports.len(), 2);
        let first = &reports[0];
        assert_eq!(first.dataset, "tao-sn64");
        assert!(first.complete);
        assert_eq!(first.records, 3);
        assert_eq!(first.skipped_records, 1);
        assert_eq!(first.identity_gaps, 1);

        let summaries = sink.summaries.lock().unwrap().clone();
        let c1 = summaries
            .iter()
            .find(|s| s.period.index == 0 && s.entity.as_str() == "c1")
            .unwrap();
        // block 105 wins for h1, everything valued at price 2.0
        assert_eq!(c1.subjects, 2);
        assert!((c1.stake_total - 8.0).abs() < 1e-9);
        assert!((c1.stake_share - 0.5).abs() < 1e-9);
        assert!(summaries.iter().any(|s| s.entity.as_str() == "legacy_h3"));

        // stake, reward and incentive for each of the two periods
        assert_eq!(points.len(), 6);
        assert_eq!(sink.points.lock().unwrap().len(), 6);
        assert_eq!(collector.failed_writes(), 0);
        let stake = points
            .iter()
            .find(|p| p.period.index == 0 && p.metric == Metric::Stake)
            .unwrap();
        assert_eq!(stake.participants, 2);
        assert_eq!(stake.nakamoto, 1);

        let incentive = points
            .iter()
            .find(|p| p.period.index == 0 && p.metric == Metric::Incentive)
            .unwrap();
        assert_eq!(incentive.participants, 3);
        assert!(incentive.gini.abs() < 1e-9);
        assert!((incentive.total_value - 0.3).abs() < 1e-9);
        assert!(!points.iter().any(|p| p.dataset == COMBINED_SUBNET_DATASET));
    }

    #[tokio::test]
    async fn test_failed_window_is_reported_not_fatal() {
        let server = MockServer::start().await;
        mount_prices(&server).await;
        Mock::given(path("/metagraph/history/v1"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let collector = Collector::new(config(&[]), sink.clone());
        let client = client(&server);
        let points = collector.run(Some(&client), None).await.unwrap();

        let reports = sink.reports.lock().unwrap().clone();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| !r.complete && r.error.is_some()));
        assert!(points.is_empty());
        assert!(sink.summaries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_price_fetch_marks_every_subnet_window() {
        let server = MockServer::start().await;
        Mock::given(path("/dtao/pool/history/v1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("pool index rebuilding"))
            .mount(&server)
            .await;
        mount_metagraph(&server, "64", json!([neuron("h1", Some("c1"), 100, 1_000_000_000)])).await;
        mount_metagraph(&server, "1", json!([neuron("h9", Some("c2"), 100, 1_000_000_000)])).await;

        let sink = Arc::new(MemorySink::default());
        let collector = Collector::new(config(&[("STAKESPREAD_SUBNETS", "64,1")]), sink.clone());
        let client = client(&server);
        collector.run(Some(&client), None).await.unwrap();

        let reports = sink.reports.lock().unwrap().clone();
        // two subnets plus the combined dataset, for each of two periods
        assert_eq!(reports.len(), 6);
        for report in &reports {
            assert!(!report.complete, "{} period {}", report.dataset, report.period.index);
            let error = report.error.as_deref().unwrap();
            assert!(error.contains("pool prices incomplete"), "{}", error);
            assert!(error.contains("500"), "{}", error);
        }

        // rows are still written, valued at the default price
        let summaries = sink.summaries.lock().unwrap().clone();
        let c1 = summaries
            .iter()
            .find(|s| s.dataset == "tao-sn64" && s.period.index == 0 && s.entity.as_str() == "c1")
            .unwrap();
        assert!((c1.stake_total - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_coldkeys_combine_across_subnets() {
        let server = MockServer::start().await;
        mount_prices(&server).await;
        mount_metagraph(&server, "64", json!([neuron("h1", Some("c1"), 100, 1_000_000_000)])).await;
        mount_metagraph(
            &server,
            "1",
            json!([
                neuron("h9", Some("c1"), 100, 3_000_000_000u64),
                neuron("h8", Some("c2"), 100, 5_000_000_000u64),
            ]),
        )
        .await;

        let sink = Arc::new(MemorySink::default());
        let collector = Collector::new(
            config(&[("STAKESPREAD_SUBNETS", "64,1"), ("STAKESPREAD_END_DATE", "2025-02-13")]),
            sink.clone(),
        );
        let client = client(&server);
        let points = collector.run(Some(&client), None).await.unwrap();

        let reports = sink.reports.lock().unwrap().clone();
        let datasets: Vec<_> = reports.iter().map(|r| r.dataset.as_str()).collect();
        assert_eq!(datasets, vec!["tao-sn64", "tao-sn1", COMBINED_SUBNET_DATASET]);
        let combined = &reports[2];
        assert!(combined.complete);
        assert_eq!(combined.records, 3);
        assert_eq!(combined.pages, reports[0].pages + reports[1].pages);

        let summaries = sink.summaries.lock().unwrap().clone();
        let all: Vec<_> = summaries.iter().filter(|s| s.dataset == COMBINED_SUBNET_DATASET).collect();
        assert_eq!(all.len(), 2);
        // 1.0 alpha at 2.0 on SN64 plus 3.0 alpha at the default price on SN1
        let c1 = all.iter().find(|s| s.entity.as_str() == "c1").unwrap();
        assert_eq!(c1.subjects, 2);
        assert!((c1.stake_total - 5.0).abs() < 1e-9);
        assert!((c1.stake_share - 0.5).abs() < 1e-9);

        let stake = points
            .iter()
            .find(|p| p.dataset == COMBINED_SUBNET_DATASET && p.metric == Metric::Stake)
            .unwrap();
        assert_eq!(stake.participants, 2);
        assert!(stake.gini.abs() < 1e-9);
        // incentive stays per subnet
        assert!(!points
            .iter()
            .any(|p| p.dataset == COMBINED_SUBNET_DATASET && p.metric == Metric::Incentive));
    }

    /// Sink that rejects the windows of one period.
    #[derive(Default)]
    struct FlakySink {
        inner: MemorySink,
        failing_period: u32,
    }

    #[async_trait]
    impl RunSink for FlakySink {
        async fn write_window(&self, report: &WindowReport, summaries: &[EntityPeriodSummary]) -> Result<()> {
            if report.period.index == self.failing_period {
                anyhow::bail!("connection reset by peer");
            }
            self.inner.write_window(report, summaries).await
        }

        async fn write_inequality(&self, points: &[InequalityPoint]) -> Result<()> {
            self.inner.write_inequality(points).await
        }
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_the_run() {
        let server = MockServer::start().await;
        mount_prices(&server).await;
        mount_metagraph(&server, "64", json!([neuron("h1", Some("c1"), 100, 1_000_000_000)])).await;

        let sink = Arc::new(FlakySink::default());
        let collector = Collector::new(config(&[]), sink.clone());
        let client = client(&server);
        let points = collector.run(Some(&client), None).await.unwrap();

        assert_eq!(collector.failed_writes(), 1);
        let reports = sink.inner.reports.lock().unwrap().clone();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].period.index, 1);
        // the rejected window is still measured
        assert_eq!(points.len(), 6);
        assert!(points.iter().any(|p| p.period.index == 0 && p.metric == Metric::Stake));
        assert_eq!(sink.inner.points.lock().unwrap().len(), 6);
    }

    fn balance_row(index: u64, balance: u64) -> Value {
        json!({
            "validatorindex": index,
            "balance": balance,
            "effectivebalance": 32_000_000_000u64,
            "epoch": 1,
        })
    }

    fn credential(owner: u8) -> String {
        format!("0x01{}{}", "00".repeat(11), format!("{:02x}", owner).repeat(20))
    }

    fn registry() -> ValidatorRegistry {
        let raw = json!({"validators": [
            {"index": 1, "withdrawal_credentials": credential(0xaa)},
            {"index": 2, "withdrawal_credentials": format!("0x00{}", "11".repeat(31))},
        ]})
        .to_string();
        ValidatorRegistry::from_json(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_beacon_run_derives_flows() {
        let server = MockServer::start().await;
        let first = epoch_at(config(&[]).start).to_string();
        Mock::given(path_regex(r"^/validator/1,2/balancehistory$"))
            .and(query_param("latest_epoch", first.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [balance_row(1, 500), balance_row(2, 900)]
            })))
            .mount(&server)
            .await;
        Mock::given(path_regex(r"^/validator/1,2/balancehistory$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [balance_row(1, 700), balance_row(2, 800)]
            })))
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let collector = Collector::new(config(&[]), sink.clone());
        let client = client(&server);
        let points = collector
            .run_beacon(&client, &registry(), &collector.periods())
            .await
            .unwrap();

        let reports = sink.reports.lock().unwrap().clone();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.complete && r.identity_gaps == 1));

        let summaries = sink.summaries.lock().unwrap().clone();
        let second: Vec<_> = summaries.iter().filter(|s| s.period.index == 1).collect();
        let owner = second.iter().find(|s| s.entity.as_str() == format!("0x{}", "aa".repeat(20))).unwrap();
        let legacy = second.iter().find(|s| s.entity.as_str() == "legacy_2").unwrap();
        assert_eq!(owner.reward_total, 200.0);
        // clamped by default
        assert_eq!(legacy.reward_total, 0.0);
        assert_eq!(owner.reward_share, 1.0);
        assert!(summaries.iter().filter(|s| s.period.index == 0).all(|s| s.reward_total == 0.0));

        // stake and reward per period plus one validator count point each
        assert_eq!(points.len(), 6);
        assert!(points.iter().all(|p| p.dataset == BEACON_DATASET));
        let counts: Vec<_> = points.iter().filter(|p| p.metric == Metric::Validators).collect();
        assert_eq!(counts.len(), 2);
        assert!(counts.iter().all(|p| p.participants == 2 && p.total_value == 2.0));
    }

    #[tokio::test]
    async fn test_beacon_run_fetches_only_active_validators() {
        let server = MockServer::start().await;
        let first_epoch = epoch_at(config(&[]).start);
        // validator 3 exits before the first anchor, validator 4 activates
        // between the two anchors
        let raw = json!({"validators": [
            {"index": 1, "withdrawal_credentials": credential(0xaa), "activation_epoch": "0"},
            {"index": 2, "withdrawal_credentials": credential(0xaa), "activation_epoch": 0,
             "exit_epoch": "18446744073709551615"},
            {"index": 3, "withdrawal_credentials": credential(0xbb), "activation_epoch": 0,
             "exit_epoch": first_epoch},
            {"index": 4, "withdrawal_credentials": credential(0xbb), "activation_epoch": first_epoch + 1},
        ]})
        .to_string();
        let registry = ValidatorRegistry::from_json(&raw).unwrap();

        Mock::given(path_regex(r"^/validator/1,2/balancehistory$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [balance_row(1, 500), balance_row(2, 500)]
            })))
            .mount(&server)
            .await;
        Mock::given(path_regex(r"^/validator/1,2,4/balancehistory$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [balance_row(1, 500), balance_row(2, 500), balance_row(4, 500)]
            })))
            .mount(&server)
            .await;

        let sink = Arc::new(MemorySink::default());
        let collector = Collector::new(config(&[]), sink.clone());
        let client = client(&server);
        let points = collector
            .run_beacon(&client, &registry, &collector.periods())
            .await
            .unwrap();

        let reports = sink.reports.lock().unwrap().clone();
        assert!(reports.iter().all(|r| r.complete));
        assert_eq!(reports[0].records, 2);
        assert_eq!(reports[1].records, 3);

        let counts: Vec<_> = points.iter().filter(|p| p.metric == Metric::Validators).collect();
        assert_eq!(counts[0].participants, 1);
        assert_eq!(counts[0].total_value, 2.0);
        assert_eq!(counts[1].participants, 2);
        assert_eq!(counts[1].total_value, 3.0);
    }

    #[tokio::test]
    async fn test_no_registry_skips_beacon() {
        let sink = Arc::new(MemorySink::default());
        let collector = Collector::new(config(&[]), sink.clone());
        assert!(collector.load_registry().await.unwrap().is_none());
    }

    #[test]
    fn test_dataset_labels() {
        assert_eq!(subnet_dataset(64), "tao-sn64");
        assert_eq!(BEACON_DATASET, "eth");
        assert_eq!(COMBINED_SUBNET_DATASET, "tao-all");
    }
}
