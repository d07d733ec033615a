//! Checks and repairs for the Ads dashboard HTML template.

use std::{fs, path::Path};

use {
    anyhow::{Context, bail},
    tracing::{info, warn},
};

/// Declaration that pins the dashboard to a local development server.
pub const LOCALHOST_BASE_URL: &str = "const API_BASE_URL = 'http://localhost:5002/api';";
/// Declaration that resolves the API relative to wherever the page is served.
pub const RELATIVE_BASE_URL: &str = "const API_BASE_URL = window.location.origin + '/api';";

const BASE_URL_MARKER: &str = "const API_BASE_URL";

/// Script functions and CSS classes the dashboard needs to render metrics.
pub const REQUIRED_ELEMENTS: [&str; 7] = [
    "displayMetrics",
    "loadPerformanceData",
    "formatNumber",
    "formatCurrency",
    "updatePerformanceChart",
    "metric-value",
    "metric-change",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiBaseUrl {
    /// Still pointing at the development server.
    Localhost,
    /// The (trimmed) declaration line currently in use.
    Configured(String),
    Missing,
}

impl ApiBaseUrl {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Configured(line) if !line.contains("localhost"))
    }
}

pub fn api_base_url(content: &str) -> ApiBaseUrl {
    if content.contains(LOCALHOST_BASE_URL) {
        return ApiBaseUrl::Localhost;
    }
    content
        .lines()
        .find(|line| line.contains(BASE_URL_MARKER))
        .map_or(ApiBaseUrl::Missing, |line| {
            ApiBaseUrl::Configured(line.trim().to_string())
        })
}

/// Point the API base URL at the serving origin. Returns `None` when the
/// template declares no base URL at all.
pub fn fix_api_base_url(content: &str) -> Option<String> {
    if content.contains(LOCALHOST_BASE_URL) {
        return Some(content.replace(LOCALHOST_BASE_URL, RELATIVE_BASE_URL));
    }

    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    let line = lines.iter_mut().find(|l| l.contains(BASE_URL_MARKER))?;
    let indent_len = line.len() - line.trim_start().len();
    let indent = line[..indent_len].to_string();
    *line = format!("{indent}{RELATIVE_BASE_URL}");
    Some(lines.join("\n"))
}

pub fn missing_elements(content: &str) -> Vec<&'static str> {
    REQUIRED_ELEMENTS
        .iter()
        .copied()
        .filter(|element| !content.contains(element))
        .collect()
}

/// Result of inspecting a template file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateReport {
    pub api_base_url: ApiBaseUrl,
    pub missing_elements: Vec<&'static str>,
}

impl TemplateReport {
    pub fn is_healthy(&self) -> bool {
        self.api_base_url.is_ok() && self.missing_elements.is_empty()
    }
}

pub fn check_template(path: &Path) -> anyhow::Result<TemplateReport> {
    let content = read_template(path)?;
    let report = TemplateReport {
        api_base_url: api_base_url(&content),
        missing_elements: missing_elements(&content),
    };

    match &report.api_base_url {
        ApiBaseUrl::Localhost => {
            warn!("API base URL is set to localhost in the dashboard template")
        },
        ApiBaseUrl::Missing => warn!("API_BASE_URL not found in dashboard template"),
        ApiBaseUrl::Configured(line) => info!(%line, "current API base URL"),
    }
    if !report.missing_elements.is_empty() {
        warn!(missing = ?report.missing_elements, "dashboard template is missing elements");
    }
    Ok(report)
}

/// Rewrite the template's API base URL when it is not already relative.
/// Returns whether the file changed.
pub fn fix_template(path: &Path) -> anyhow::Result<bool> {
    let content = read_template(path)?;
    if api_base_url(&content).is_ok() && content.contains(RELATIVE_BASE_URL) {
        return Ok(false);
    }

    let Some(updated) = fix_api_base_url(&content) else {
        bail!("API_BASE_URL not found in {}", path.display());
    };
    if updated == content {
        return Ok(false);
    }

    fs::write(path, updated)
        .with_context(|| format!("failed to write dashboard template {}", path.display()))?;
    info!(path = %path.display(), "API base URL fixed to use relative URLs");
    Ok(true)
}

fn read_template(path: &Path) -> anyhow::Result<String> {
    if !path.exists() {
        bail!("dashboard template not found at {}", path.display());
    }
    fs::read_to_string(path)
        .with_context(|| format!("failed to read dashboard template {}", path.display()))
}
