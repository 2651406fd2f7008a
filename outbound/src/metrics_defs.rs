use shared::metrics_defs::{MetricDef, MetricType};

pub const OUTBOUND_ATTEMPTS: MetricDef = MetricDef {
    name: "outbound.attempts",
    metric_type: MetricType::Counter,
    description: "Delivery attempts made to the RGBridge endpoint",
};

pub const OUTBOUND_FAILURES: MetricDef = MetricDef {
    name: "outbound.failures",
    metric_type: MetricType::Counter,
    description: "Failed delivery attempts. Tagged with reason.",
};

pub const OUTBOUND_RETRIES_EXHAUSTED: MetricDef = MetricDef {
    name: "outbound.retries_exhausted",
    metric_type: MetricType::Counter,
    description: "Deliveries that failed on every attempt",
};

pub const OUTBOUND_DURATION: MetricDef = MetricDef {
    name: "outbound.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of a single delivery attempt in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    OUTBOUND_ATTEMPTS,
    OUTBOUND_FAILURES,
    OUTBOUND_RETRIES_EXHAUSTED,
    OUTBOUND_DURATION,
];
