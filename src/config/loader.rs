//! Process settings read from the environment.

use crate::error::ConfigError;
use std::str::FromStr;

pub const DEFAULT_STORE_SCHEMA: &str = "storefront";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 60;
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Settings {
    /// Absent means documents live in memory for the life of the process.
    pub database_url: Option<String>,
    pub store_schema: String,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub bind_addr: String,
    pub port: u16,
    /// Refuse to start when a route declaration cannot be mounted.
    pub strict_routes: bool,
    pub body_limit: usize,
}

impl Settings {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(Self {
            database_url: get("DATABASE_URL"),
            store_schema: get("STORE_SCHEMA").unwrap_or_else(|| DEFAULT_STORE_SCHEMA.into()),
            jwt_secret: get("JWT_SECRET").ok_or(ConfigError::MissingSetting("JWT_SECRET"))?,
            token_ttl_days: parse_or(get("TOKEN_TTL_DAYS"), "TOKEN_TTL_DAYS", DEFAULT_TOKEN_TTL_DAYS)?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(get("PORT"), "PORT", DEFAULT_PORT)?,
            strict_routes: match get("STRICT_ROUTES") {
                None => true,
                Some(v) => parse_flag(&v).ok_or(ConfigError::InvalidSetting {
                    key: "STRICT_ROUTES",
                    value: v,
                })?,
            },
            body_limit: parse_or(get("BODY_LIMIT_BYTES"), "BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT)?,
        })
    }

    /// Settings for tests and embedding: in-memory store, lenient defaults.
    pub fn for_secret(secret: impl Into<String>) -> Self {
        Self {
            database_url: None,
            store_schema: DEFAULT_STORE_SCHEMA.into(),
            jwt_secret: secret.into(),
            token_ttl_days: DEFAULT_TOKEN_TTL_DAYS,
            bind_addr: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            strict_routes: true,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidSetting { key, value: v }),
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let s = settings(&[("JWT_SECRET", "s")]).unwrap();
        assert_eq!(s.port, 5000);
        assert_eq!(s.store_schema, "storefront");
        assert!(s.database_url.is_none());
        assert!(s.strict_routes);
        assert_eq!(s.listen_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn secret_is_required() {
        assert!(matches!(settings(&[]), Err(ConfigError::MissingSetting("JWT_SECRET"))));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = settings(&[("JWT_SECRET", "s"), ("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { key: "PORT", .. }));
        let err = settings(&[("JWT_SECRET", "s"), ("STRICT_ROUTES", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { key: "STRICT_ROUTES", .. }));
        let s = settings(&[("JWT_SECRET", "s"), ("STRICT_ROUTES", "off")]).unwrap();
        assert!(!s.strict_routes);
    }
}
