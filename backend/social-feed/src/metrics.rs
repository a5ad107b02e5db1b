use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, TextEncoder};

static EDGE_WRITES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "social_feed_edge_writes_total",
            "Edge creates/deletes applied by the toggle engine",
        ),
        &["relation", "action"],
    )
    .expect("failed to create social_feed_edge_writes_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register social_feed_edge_writes_total");
    counter
});

static CASCADE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "social_feed_cascade_failures_total",
            "Dependent writes that failed after their edge write succeeded",
        ),
        &["relation", "step"],
    )
    .expect("failed to create social_feed_cascade_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register social_feed_cascade_failures_total");
    counter
});

static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "social_feed_notifications_total",
            "Notification fan-out attempts by outcome",
        ),
        &["kind", "outcome"],
    )
    .expect("failed to create social_feed_notifications_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register social_feed_notifications_total");
    counter
});

static PAGE_FETCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "social_feed_page_fetches_total",
            "Feed page requests by kind and outcome",
        ),
        &["kind", "outcome"],
    )
    .expect("failed to create social_feed_page_fetches_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register social_feed_page_fetches_total");
    counter
});

static BLOCK_LIST_REFRESH_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "social_feed_block_list_refresh_failures_total",
        "Block list re-reads that failed while handling a change signal",
    )
    .expect("failed to create social_feed_block_list_refresh_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register social_feed_block_list_refresh_failures_total");
    counter
});

pub fn record_edge_write(relation: &str, action: &str) {
    EDGE_WRITES_TOTAL.with_label_values(&[relation, action]).inc();
}

pub fn record_cascade_failure(relation: &str, step: &str) {
    CASCADE_FAILURES_TOTAL
        .with_label_values(&[relation, step])
        .inc();
}

pub fn record_notification(kind: &str, outcome: &str) {
    NOTIFICATIONS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn record_page_fetch(kind: &str, outcome: &str) {
    PAGE_FETCHES_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn record_block_list_refresh_failure() {
    BLOCK_LIST_REFRESH_FAILURES_TOTAL.inc();
}

pub fn block_list_refresh_failures() -> u64 {
    BLOCK_LIST_REFRESH_FAILURES_TOTAL.get()
}

/// Text exposition of every metric in the default registry
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}", err);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
