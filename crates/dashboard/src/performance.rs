//! Reshapes raw Google Ads metrics into the fixed schema the dashboard
//! renders.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    thiserror::Error,
};

/// Metric keys of the dashboard payload, in display order.
pub const METRIC_KEYS: [&str; 7] = [
    "impressions",
    "clicks",
    "conversions",
    "cost",
    "conversionRate",
    "clickThroughRate",
    "costPerConversion",
];

const MICROS_PER_UNIT: f64 = 1_000_000.0;

/// Totals for one reporting period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: f64,
    /// Spend in account currency units.
    pub cost: f64,
}

impl RawMetrics {
    /// Build from API totals, where spend is reported in micros.
    pub fn from_cost_micros(
        impressions: u64,
        clicks: u64,
        conversions: f64,
        cost_micros: i64,
    ) -> Self {
        Self {
            impressions,
            clicks,
            conversions,
            cost: cost_micros as f64 / MICROS_PER_UNIT,
        }
    }

    pub fn click_through_rate(&self) -> f64 {
        ratio(self.clicks as f64, self.impressions as f64) * 100.0
    }

    pub fn conversion_rate(&self) -> f64 {
        ratio(self.conversions, self.clicks as f64) * 100.0
    }

    pub fn cost_per_conversion(&self) -> f64 {
        ratio(self.cost, self.conversions)
    }
}

/// Raw payload: the requested period plus the period before it, when known.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPerformance {
    pub current: RawMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<RawMetrics>,
}

/// One dashboard cell: the value and its percentage change against the
/// previous period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub change: f64,
}

impl MetricValue {
    fn new(current: f64, previous: Option<f64>) -> Self {
        Self {
            value: round2(current),
            change: round2(percent_change(current, previous)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub impressions: MetricValue,
    pub clicks: MetricValue,
    pub conversions: MetricValue,
    pub cost: MetricValue,
    pub conversion_rate: MetricValue,
    pub click_through_rate: MetricValue,
    pub cost_per_conversion: MetricValue,
}

impl PerformanceReport {
    /// Cells keyed by their payload name, in display order.
    pub fn metrics(&self) -> [(&'static str, MetricValue); 7] {
        [
            (METRIC_KEYS[0], self.impressions),
            (METRIC_KEYS[1], self.clicks),
            (METRIC_KEYS[2], self.conversions),
            (METRIC_KEYS[3], self.cost),
            (METRIC_KEYS[4], self.conversion_rate),
            (METRIC_KEYS[5], self.click_through_rate),
            (METRIC_KEYS[6], self.cost_per_conversion),
        ]
    }
}

pub fn format_performance(raw: &RawPerformance) -> PerformanceReport {
    let cur = &raw.current;
    let prev = raw.previous.as_ref();
    let cell = |f: fn(&RawMetrics) -> f64| MetricValue::new(f(cur), prev.map(f));

    PerformanceReport {
        impressions: cell(|m| m.impressions as f64),
        clicks: cell(|m| m.clicks as f64),
        conversions: cell(|m| m.conversions),
        cost: cell(|m| m.cost),
        conversion_rate: cell(RawMetrics::conversion_rate),
        click_through_rate: cell(RawMetrics::click_through_rate),
        cost_per_conversion: cell(RawMetrics::cost_per_conversion),
    }
}

/// Problems found in a payload that should already be in dashboard shape.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadIssue {
    #[error("invalid data structure: expected an object, got {0}")]
    NotAnObject(&'static str),
    #[error("missing metrics: {}", .0.join(", "))]
    MissingMetrics(Vec<String>),
    #[error("invalid metric data: {}", .0.join(", "))]
    InvalidMetrics(Vec<String>),
}

/// Check that every metric is present and carries `value` and `change`.
pub fn validate_payload(payload: &Value) -> Result<(), PayloadIssue> {
    let obj = payload
        .as_object()
        .ok_or_else(|| PayloadIssue::NotAnObject(json_type(payload)))?;

    let missing: Vec<String> = METRIC_KEYS
        .iter()
        .filter(|key| !obj.contains_key(**key))
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PayloadIssue::MissingMetrics(missing));
    }

    let invalid: Vec<String> = METRIC_KEYS
        .iter()
        .filter_map(|key| {
            let reason = match obj.get(*key).and_then(Value::as_object) {
                None => "not an object",
                Some(m) if !m.contains_key("value") => "no value",
                Some(m) if !m.contains_key("change") => "no change",
                Some(_) => return None,
            };
            Some(format!("{key} ({reason})"))
        })
        .collect();
    if !invalid.is_empty() {
        return Err(PayloadIssue::InvalidMetrics(invalid));
    }

    Ok(())
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn percent_change(current: f64, previous: Option<f64>) -> f64 {
    match previous {
        Some(prev) if prev != 0.0 => (current - prev) / prev * 100.0,
        _ => 0.0,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
