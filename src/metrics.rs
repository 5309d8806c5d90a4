use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub widget_polls_total: CounterVec,
    pub widget_stale_results_total: Counter,
    pub widget_entities: Gauge,
    pub widget_auto_refresh_enabled: Gauge,
    pub widget_last_success_timestamp_seconds: Gauge,
    pub widget_uptime_seconds: Gauge,
    pub widget_scrape_count_total: Counter,
    started_at_unix: i64,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let widget_polls_total = CounterVec::new(
            opts!(
                "widget_polls_total",
                "Completed telemetry polls by result (success, process_error, decode_error, structural_error)"
            ),
            &["result"],
        )?;
        let widget_stale_results_total = Counter::with_opts(opts!(
            "widget_stale_results_total",
            "Poll results discarded because a newer request had been issued"
        ))?;
        let widget_entities = Gauge::with_opts(opts!(
            "widget_entities",
            "Number of entities in the last rendered snapshot"
        ))?;
        let widget_auto_refresh_enabled = Gauge::with_opts(opts!(
            "widget_auto_refresh_enabled",
            "1 when the auto-refresh timer is running"
        ))?;
        let widget_last_success_timestamp_seconds = Gauge::with_opts(opts!(
            "widget_last_success_timestamp_seconds",
            "Unix time of the last successfully rendered poll"
        ))?;
        let widget_uptime_seconds = Gauge::with_opts(opts!(
            "widget_uptime_seconds",
            "Seconds since the widget started"
        ))?;
        let widget_scrape_count_total = Counter::with_opts(opts!(
            "widget_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;

        register(&registry, &widget_polls_total)?;
        register(&registry, &widget_stale_results_total)?;
        register(&registry, &widget_entities)?;
        register(&registry, &widget_auto_refresh_enabled)?;
        register(&registry, &widget_last_success_timestamp_seconds)?;
        register(&registry, &widget_uptime_seconds)?;
        register(&registry, &widget_scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            widget_polls_total,
            widget_stale_results_total,
            widget_entities,
            widget_auto_refresh_enabled,
            widget_last_success_timestamp_seconds,
            widget_uptime_seconds,
            widget_scrape_count_total,
            started_at_unix: now_unix(),
        }))
    }

    pub fn record_success(&self, entities: u64) {
        self.widget_polls_total.with_label_values(&["success"]).inc();
        self.widget_entities.set(entities as f64);
        self.widget_last_success_timestamp_seconds
            .set(now_unix() as f64);
    }

    pub fn record_failure(&self, kind: &str) {
        self.widget_polls_total.with_label_values(&[kind]).inc();
    }

    pub fn inc_stale_result(&self) {
        self.widget_stale_results_total.inc();
    }

    pub fn set_auto_refresh(&self, running: bool) {
        self.widget_auto_refresh_enabled
            .set(if running { 1.0 } else { 0.0 });
    }

    pub fn inc_scrape_count(&self) {
        self.widget_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let uptime = now_unix().saturating_sub(self.started_at_unix) as f64;
        self.widget_uptime_seconds.set(uptime);

        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
