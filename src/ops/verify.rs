//! Post-deployment smoke checks over HTTP.

use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use tracing::{debug, warn};

use super::compose;
use crate::config::Settings;
use crate::error::Result;
use crate::exec::CommandRunner;

pub const HEALTH_PATHS: &[&str] = &["/health/", "/health/live/", "/health/ready/"];
pub const SECURITY_HEADERS: &[&str] = &[
    "strict-transport-security",
    "x-content-type-options",
    "x-frame-options",
    "referrer-policy",
];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub path: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl HealthCheck {
    pub fn passed(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub base_url: String,
    pub health: Vec<HealthCheck>,
    /// Advisory only.
    pub missing_headers: Vec<String>,
    /// `docker-compose ps` output when it could be collected.
    pub services: Option<String>,
}

impl VerifyReport {
    pub fn healthy(&self) -> bool {
        self.health.iter().all(HealthCheck::passed)
    }

    pub fn failures(&self) -> Vec<String> {
        self.health
            .iter()
            .filter(|c| !c.passed())
            .map(|c| match (&c.status, &c.error) {
                (Some(status), _) => format!("{} returned {status}", c.path),
                (None, Some(error)) => format!("{}: {error}", c.path),
                (None, None) => format!("{}: no response", c.path),
            })
            .collect()
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deployment checks for {}", self.base_url)?;
        for check in &self.health {
            let mark = if check.passed() { "ok  " } else { "FAIL" };
            match check.status {
                Some(status) => writeln!(f, "  [{mark}] {} ({status})", check.path)?,
                None => writeln!(
                    f,
                    "  [{mark}] {} ({})",
                    check.path,
                    check.error.as_deref().unwrap_or("no response")
                )?,
            }
        }
        if self.missing_headers.is_empty() {
            writeln!(f, "  Security headers: all present")?;
        } else {
            writeln!(
                f,
                "  Security headers missing (warning): {}",
                self.missing_headers.join(", ")
            )?;
        }
        if let Some(services) = &self.services {
            writeln!(f, "\nServices:\n{services}")?;
        }
        Ok(())
    }
}

pub fn missing_security_headers(headers: &HeaderMap) -> Vec<String> {
    SECURITY_HEADERS
        .iter()
        .filter(|name| !headers.contains_key(**name))
        .map(|name| name.to_string())
        .collect()
}

pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .redirect(Policy::none())
        .user_agent(concat!("basekit/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

async fn check_health(client: &reqwest::Client, base_url: &str, path: &str) -> HealthCheck {
    let url = format!("{base_url}{path}");
    debug!(url = %url, "checking");
    match client.get(&url).send().await {
        Ok(response) => HealthCheck {
            path: path.to_string(),
            status: Some(response.status().as_u16()),
            error: None,
        },
        Err(e) => HealthCheck {
            path: path.to_string(),
            status: None,
            error: Some(e.to_string()),
        },
    }
}

/// Run every check. Only unreachable or non-2xx health endpoints make the
/// report unhealthy; missing headers are logged as warnings.
pub async fn verify(
    client: &reqwest::Client,
    runner: &dyn CommandRunner,
    settings: &Settings,
    base_url: &str,
) -> VerifyReport {
    let base_url = base_url.trim_end_matches('/').to_string();
    let mut report = VerifyReport {
        base_url: base_url.clone(),
        ..Default::default()
    };

    for path in HEALTH_PATHS {
        report.health.push(check_health(client, &base_url, path).await);
    }

    match client.get(format!("{base_url}/")).send().await {
        Ok(response) => {
            report.missing_headers = missing_security_headers(response.headers());
            for header in &report.missing_headers {
                warn!(header = %header, "security header missing");
            }
        }
        Err(e) => warn!(error = %e, "could not fetch base URL for header checks"),
    }

    match runner.output(&compose(settings).arg("ps")).await {
        Ok(output) if output.success() => report.services = Some(output.stdout_text()),
        Ok(output) => debug!(stderr = %output.stderr_text(), "compose ps failed"),
        Err(e) => debug!(error = %e, "compose unavailable"),
    }

    report
}
