//! Metrics definitions for the translator.

use shared::metrics_defs::{MetricDef, MetricType};

pub const MAPPING_CACHE_HIT: MetricDef = MetricDef {
    name: "mapping_cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of mapping loads served from the in-memory cache",
};

pub const MAPPING_CACHE_MISS: MetricDef = MetricDef {
    name: "mapping_cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of mapping loads that had to read the mapping provider",
};

pub const MAPPING_SAVES: MetricDef = MetricDef {
    name: "mapping.saves",
    metric_type: MetricType::Counter,
    description: "Number of mapping documents written through the store",
};

pub const PLUGIN_LOAD_FAILURES: MetricDef = MetricDef {
    name: "plugin.load_failures",
    metric_type: MetricType::Counter,
    description: "Number of plugin resolutions that failed to instantiate the plugin",
};

pub const ALL_METRICS: &[MetricDef] = &[
    MAPPING_CACHE_HIT,
    MAPPING_CACHE_MISS,
    MAPPING_SAVES,
    PLUGIN_LOAD_FAILURES,
];
