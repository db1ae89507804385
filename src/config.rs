use crate::{AppResult, error::AppError};

/// Process configuration, read once at startup from the environment
/// (a `.env` file is honored in development).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Non-production escape hatch: lets a websocket connection observe
    /// purchase-scoped rooms without a handshake token. Sends still require
    /// an authenticated identity.
    pub allow_unauthenticated: bool,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let database_url = dotenv::var("DATABASE_URL")
            .map_err(|_| AppError::Invalid("DATABASE_URL is not set"))?;
        let bind_addr =
            dotenv::var("SECONDACT_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
        let allow_unauthenticated = dotenv::var("SECONDACT_ALLOW_UNAUTHENTICATED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            bind_addr,
            allow_unauthenticated,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_owned(),
            bind_addr: "0.0.0.0:8080".to_owned(),
            allow_unauthenticated: false,
        }
    }
}
