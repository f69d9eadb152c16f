//! TLS certificates for the nginx front end.

use std::path::{Path, PathBuf};

use tracing::info;

use super::compose;
use crate::config::Settings;
use crate::error::{BasekitError, Result};
use crate::exec::{CommandRunner, CommandSpec};

const CERT_DAYS: &str = "365";
const CERTBOT_WEBROOT: &str = "/var/www/certbot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SslOutcome {
    Issued { cert: PathBuf, key: PathBuf },
    /// Let's Encrypt keeps its files in the certbot volume.
    Requested { domain: String },
    DryRun { command: String },
}

fn validate_domain(domain: &str) -> Result<()> {
    let valid = !domain.is_empty()
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(BasekitError::Config {
            key: "domain".to_string(),
            value: domain.to_string(),
        })
    }
}

pub fn self_signed_command(domain: &str, out_dir: &Path) -> CommandSpec {
    let key = out_dir.join("key.pem");
    let cert = out_dir.join("cert.pem");
    CommandSpec::new("openssl").args([
        "req".to_string(),
        "-x509".to_string(),
        "-nodes".to_string(),
        "-days".to_string(),
        CERT_DAYS.to_string(),
        "-newkey".to_string(),
        "rsa:2048".to_string(),
        "-keyout".to_string(),
        key.display().to_string(),
        "-out".to_string(),
        cert.display().to_string(),
        "-subj".to_string(),
        format!("/CN={domain}"),
    ])
}

pub fn letsencrypt_command(settings: &Settings, domain: &str, email: &str, staging: bool) -> CommandSpec {
    let mut spec = compose(settings).args([
        "run",
        "--rm",
        "certbot",
        "certonly",
        "--webroot",
        "-w",
        CERTBOT_WEBROOT,
        "-d",
        domain,
        "--email",
        email,
        "--agree-tos",
        "--no-eff-email",
    ]);
    if staging {
        spec = spec.arg("--staging");
    }
    spec
}

pub async fn self_signed(
    runner: &dyn CommandRunner,
    domain: &str,
    out_dir: &Path,
    dry_run: bool,
) -> Result<SslOutcome> {
    validate_domain(domain)?;
    let spec = self_signed_command(domain, out_dir);
    if dry_run {
        return Ok(SslOutcome::DryRun {
            command: spec.display(),
        });
    }

    std::fs::create_dir_all(out_dir).map_err(|e| BasekitError::io(out_dir, e))?;
    runner.run(&spec).await?;
    info!(domain, dir = %out_dir.display(), "self-signed certificate generated");
    Ok(SslOutcome::Issued {
        cert: out_dir.join("cert.pem"),
        key: out_dir.join("key.pem"),
    })
}

pub async fn letsencrypt(
    runner: &dyn CommandRunner,
    settings: &Settings,
    domain: &str,
    email: &str,
    staging: bool,
    dry_run: bool,
) -> Result<SslOutcome> {
    validate_domain(domain)?;
    if !email.contains('@') {
        return Err(BasekitError::Config {
            key: "email".to_string(),
            value: email.to_string(),
        });
    }
    let spec = letsencrypt_command(settings, domain, email, staging);
    if dry_run {
        return Ok(SslOutcome::DryRun {
            command: spec.display(),
        });
    }

    runner.run(&spec).await?;
    info!(domain, staging, "certificate requested from Let's Encrypt");
    Ok(SslOutcome::Requested {
        domain: domain.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::exec::CommandOutput;
    use crate::exec::testing::ScriptedRunner;

    #[tokio::test]
    async fn self_signed_creates_dir_and_runs_openssl() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nginx/ssl");
        let runner = ScriptedRunner::new();

        let outcome = self_signed(&runner, "example.com", &out, false).await.unwrap();
        assert_eq!(
            outcome,
            SslOutcome::Issued {
                cert: out.join("cert.pem"),
                key: out.join("key.pem"),
            }
        );
        assert!(out.is_dir());
        let calls = runner.calls();
        assert!(calls[0].starts_with("openssl req -x509 -nodes -days 365 -newkey rsa:2048"));
        assert!(calls[0].ends_with("-subj /CN=example.com"));
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("ssl");
        let runner = ScriptedRunner::new();
        let outcome = self_signed(&runner, "example.com", &out, true).await.unwrap();
        assert!(matches!(outcome, SslOutcome::DryRun { .. }));
        assert!(!out.exists());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn letsencrypt_runs_certbot_through_compose() {
        let runner = ScriptedRunner::new();
        letsencrypt(&runner, &Settings::default(), "example.com", "ops@example.com", true, false)
            .await
            .unwrap();
        assert!(runner.called(
            "docker-compose run --rm certbot certonly --webroot -w /var/www/certbot -d example.com --email ops@example.com --agree-tos --no-eff-email --staging"
        ));
    }

    #[tokio::test]
    async fn certbot_failure_is_fatal() {
        let runner = ScriptedRunner::new().on("docker-compose run", CommandOutput::failed(1, "challenge failed"));
        assert!(matches!(
            letsencrypt(&runner, &Settings::default(), "example.com", "ops@example.com", false, false).await,
            Err(BasekitError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_inputs_are_rejected() {
        let runner = ScriptedRunner::new();
        assert!(self_signed(&runner, "bad domain", Path::new("x"), true).await.is_err());
        assert!(
            letsencrypt(&runner, &Settings::default(), "example.com", "nope", false, true)
                .await
                .is_err()
        );
        assert!(runner.calls().is_empty());
    }
}
