use anyhow::{Context, Result, bail};

/// Secrets that must never reach a running server.
const PLACEHOLDER_SECRETS: &[&str] = &["", "dev-secret-change-me", "changeme", "secret"];

/// Server configuration loaded from environment variables.
///
/// | Env Var            | Default    |
/// |--------------------|------------|
/// | `VIGIL_JWT_SECRET` | (required) |
/// | `VIGIL_DB_PATH`    | `vigil.db` |
/// | `VIGIL_HOST`       | `0.0.0.0`  |
/// | `VIGIL_PORT`       | `3000`     |
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: String,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("VIGIL_JWT_SECRET").context("VIGIL_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("VIGIL_JWT_SECRET is a placeholder; set a real secret");
        }

        let port = match lookup("VIGIL_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("VIGIL_PORT must be a valid port, got {raw:?}"))?,
            None => 3000,
        };

        Ok(Self {
            jwt_secret,
            db_path: lookup("VIGIL_DB_PATH").unwrap_or_else(|| "vigil.db".into()),
            host: lookup("VIGIL_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
        })
    }
}
