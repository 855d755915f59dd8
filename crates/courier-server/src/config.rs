use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use courier_api::ApiSettings;
use courier_api::throttle::AccessWindow;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "dev-secret-change-me",
    "secret",
    "changeme",
];

/// Server configuration, read from `COURIER_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub request_log_dir: Option<PathBuf>,
    /// Usernames promoted to `admin` at startup.
    pub admins: Vec<String>,
    pub api: ApiSettings,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = std::env::var("COURIER_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("COURIER_JWT_SECRET is unset or still a placeholder");
        }

        let host = var_or("COURIER_HOST", "0.0.0.0".to_string())?;
        let port: u16 = var_or("COURIER_PORT", 8000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;

        let restricted_hours = match std::env::var("COURIER_RESTRICT_HOURS") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.parse::<AccessWindow>()
                    .map_err(|e| anyhow::anyhow!("COURIER_RESTRICT_HOURS: {e}"))?,
            ),
            _ => None,
        };

        Ok(Self {
            addr,
            db_path: var_or("COURIER_DB_PATH", PathBuf::from("courier.db"))?,
            request_log_dir: std::env::var("COURIER_REQUEST_LOG_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            admins: std::env::var("COURIER_ADMINS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect(),
            api: ApiSettings {
                jwt_secret,
                access_ttl: chrono_minutes(var_or("COURIER_ACCESS_TTL_MINUTES", 60)?),
                refresh_ttl: chrono_minutes(var_or::<i64>("COURIER_REFRESH_TTL_HOURS", 24)? * 60),
                cache_ttl: Duration::from_secs(var_or("COURIER_CACHE_TTL_SECS", 60)?),
                rate_limit: var_or("COURIER_RATE_LIMIT", 5)?,
                rate_window: Duration::from_secs(var_or("COURIER_RATE_WINDOW_SECS", 60)?),
                restricted_hours,
            },
        })
    }
}

fn chrono_minutes(minutes: i64) -> chrono::Duration {
    chrono::Duration::minutes(minutes)
}

/// Parse an environment variable, falling back to `default` when unset.
fn var_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{name}: invalid value '{raw}': {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_or_parses_and_defaults() {
        // Names unique to this test so parallel tests do not race
        assert_eq!(var_or::<u16>("COURIER_TEST_UNSET_PORT", 8000).unwrap(), 8000);

        unsafe { std::env::set_var("COURIER_TEST_BAD_PORT", "eighty") };
        assert!(var_or::<u16>("COURIER_TEST_BAD_PORT", 8000).is_err());

        unsafe { std::env::set_var("COURIER_TEST_GOOD_PORT", " 9000 ") };
        assert_eq!(var_or::<u16>("COURIER_TEST_GOOD_PORT", 8000).unwrap(), 9000);
    }
}
