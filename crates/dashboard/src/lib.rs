pub mod performance;
pub mod template;

pub use {
    performance::{
        METRIC_KEYS, MetricValue, PayloadIssue, PerformanceReport, RawMetrics, RawPerformance,
        format_performance, validate_payload,
    },
    template::{ApiBaseUrl, TemplateReport, check_template, fix_template},
};
