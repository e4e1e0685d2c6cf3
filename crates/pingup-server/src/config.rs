use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Credentials for the hosted image transformation service.
#[derive(Debug, Clone)]
pub struct HostedAssetConfig {
    pub private_key: String,
    pub url_endpoint: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub webhook_secret: String,
    /// `None` keeps uploads in `upload_dir`.
    pub hosted_assets: Option<HostedAssetConfig>,
    pub upload_dir: PathBuf,
    pub public_url: String,
    pub keep_alive: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("PINGUP_JWT_SECRET", "");
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PINGUP_JWT_SECRET is unset or still a placeholder");
        }

        let port: u16 = get("PINGUP_PORT", "3000")
            .parse()
            .context("PINGUP_PORT is not a valid port")?;
        let keep_alive_secs: u64 = get("PINGUP_KEEPALIVE_SECS", "15")
            .parse()
            .context("PINGUP_KEEPALIVE_SECS is not a number")?;

        let hosted_assets = match (
            var("PINGUP_IMAGEKIT_PRIVATE_KEY").filter(|v| !v.is_empty()),
            var("PINGUP_IMAGEKIT_URL_ENDPOINT").filter(|v| !v.is_empty()),
        ) {
            (Some(private_key), Some(url_endpoint)) => Some(HostedAssetConfig {
                private_key,
                url_endpoint,
            }),
            _ => None,
        };

        Ok(Self {
            host: get("PINGUP_HOST", "0.0.0.0"),
            public_url: get("PINGUP_PUBLIC_URL", &format!("http://localhost:{}", port)),
            port,
            db_path: get("PINGUP_DB_PATH", "pingup.db").into(),
            jwt_secret,
            webhook_secret: get("PINGUP_WEBHOOK_SECRET", ""),
            hosted_assets,
            upload_dir: get("PINGUP_UPLOAD_DIR", "./uploads").into(),
            keep_alive: Duration::from_secs(keep_alive_secs.max(1)),
        })
    }
}
