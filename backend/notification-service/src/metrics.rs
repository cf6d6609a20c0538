use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder};
use push_delivery::DeliveryReport;

static RECIPIENT_OUTCOMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_service_recipient_outcomes_total",
            "Final per-recipient outcomes reported by the delivery engine",
        ),
        &["outcome"],
    )
    .expect("failed to create notification_service_recipient_outcomes_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_service_recipient_outcomes_total");
    counter
});

static SEND_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_service_send_requests_total",
            "Send requests processed, by report status",
        ),
        &["status"],
    )
    .expect("failed to create notification_service_send_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_service_send_requests_total");
    counter
});

static SEND_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "notification_service_send_duration_seconds",
            "Wall time of one send request",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 60.0, 120.0]),
        &["status"],
    )
    .expect("failed to create notification_service_send_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register notification_service_send_duration_seconds");
    histogram
});

static REJECTED_MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_service_rejected_messages_total",
            "Incoming messages that never reached the delivery engine",
        ),
        &["reason"],
    )
    .expect("failed to create notification_service_rejected_messages_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_service_rejected_messages_total");
    counter
});

pub fn observe_report(report: &DeliveryReport) {
    for entry in &report.entries {
        RECIPIENT_OUTCOMES_TOTAL
            .with_label_values(&[entry.outcome.label()])
            .inc();
    }

    let status = report.status.as_str();
    SEND_REQUESTS_TOTAL.with_label_values(&[status]).inc();
    SEND_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(report.elapsed.as_secs_f64());
}

pub fn observe_rejected(reason: &str) {
    REJECTED_MESSAGES_TOTAL.with_label_values(&[reason]).inc();
}

/// Text exposition of every metric in the default registry
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
