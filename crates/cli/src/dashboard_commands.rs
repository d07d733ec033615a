use std::path::{Path, PathBuf};

use {
    allervie_dashboard::{ApiBaseUrl, TemplateReport, check_template, fix_template},
    anyhow::{Result, bail},
    clap::Subcommand,
};

const DEFAULT_TEMPLATE: &str = "templates/ads_dashboard.html";

#[derive(Subcommand)]
pub enum DashboardAction {
    /// Report the API base URL and any missing metric elements.
    Check {
        #[arg(long, env = "ALLERVIE_DASHBOARD_TEMPLATE", default_value = DEFAULT_TEMPLATE)]
        template: PathBuf,
    },
    /// Point the API base URL at the serving origin, then re-check.
    Fix {
        #[arg(long, env = "ALLERVIE_DASHBOARD_TEMPLATE", default_value = DEFAULT_TEMPLATE)]
        template: PathBuf,
    },
}

pub fn handle_dashboard(action: DashboardAction) -> Result<()> {
    match action {
        DashboardAction::Check { template } => check(&template),
        DashboardAction::Fix { template } => {
            if fix_template(&template)? {
                println!("Fixed API base URL in {}", template.display());
            } else {
                println!("API base URL already uses the serving origin");
            }
            check(&template)
        },
    }
}

fn check(template: &Path) -> Result<()> {
    let report = check_template(template)?;
    for line in describe(&report) {
        println!("{line}");
    }
    if !report.is_healthy() {
        bail!("dashboard template {} has issues", template.display());
    }
    Ok(())
}

fn describe(report: &TemplateReport) -> Vec<String> {
    let mut lines = vec![match &report.api_base_url {
        ApiBaseUrl::Localhost => "API base URL: set to localhost".to_string(),
        ApiBaseUrl::Missing => "API base URL: not declared".to_string(),
        ApiBaseUrl::Configured(line) if report.api_base_url.is_ok() => {
            format!("API base URL: {line}")
        },
        ApiBaseUrl::Configured(line) => format!("API base URL: {line} (points at localhost)"),
    }];

    if report.missing_elements.is_empty() {
        lines.push("Template elements: all present".into());
    } else {
        lines.push(format!(
            "Template elements missing: {}",
            report.missing_elements.join(", ")
        ));
    }
    lines
}
