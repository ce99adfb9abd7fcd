//! Metric definitions emitted by the relay.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

pub const RELAY_REQUESTS: MetricDef = MetricDef {
    name: "relay.requests",
    metric_type: MetricType::Counter,
    description: "Relayed inventory requests. Tagged with source, status.",
};

pub const RELAY_FALLBACKS: MetricDef = MetricDef {
    name: "relay.fallbacks",
    metric_type: MetricType::Counter,
    description: "Requests where the auto mode dropped to the scrape.do stage",
};

pub const ALL_METRICS: &[MetricDef] = &[RELAY_REQUESTS, RELAY_FALLBACKS];
