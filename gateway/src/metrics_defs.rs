use shared::metrics_defs::{MetricDef, MetricType};

pub const PIPELINE_REQUESTS: MetricDef = MetricDef {
    name: "pipeline.requests",
    metric_type: MetricType::Counter,
    description: "Inbound PMS messages entering the pipeline",
};

pub const PIPELINE_ERRORS: MetricDef = MetricDef {
    name: "pipeline.errors",
    metric_type: MetricType::Counter,
    description: "Pipeline runs that ended in an error. Tagged with kind, stage.",
};

pub const PIPELINE_DURATION: MetricDef = MetricDef {
    name: "pipeline.duration",
    metric_type: MetricType::Histogram,
    description: "Pipeline duration in seconds. Tagged with outcome.",
};

pub const API_UNAUTHORIZED: MetricDef = MetricDef {
    name: "api.unauthorized",
    metric_type: MetricType::Counter,
    description: "Requests rejected for a missing or wrong API key",
};

pub const ALL_METRICS: &[MetricDef] = &[
    PIPELINE_REQUESTS,
    PIPELINE_ERRORS,
    PIPELINE_DURATION,
    API_UNAUTHORIZED,
];
