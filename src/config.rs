use std::env;
use std::fmt;
use std::path::PathBuf;

const DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 15;
const DEFAULT_REFRESH_TOKEN_EXPIRE_MINUTES: i64 = 60 * 24 * 7;
const DEFAULT_MAX_SESSIONS: usize = 5;

/// Error raised when the environment does not describe a runnable service.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid { key, value } => write!(f, "{} has invalid value {:?}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Signing keys and session lifetimes.
#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    /// Name of an asymmetric JWS algorithm, e.g. `RS256`.
    pub algorithm: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_minutes: i64,
    /// Maximum concurrent refresh sessions per user, including the one being created.
    pub max_sessions: usize,
}

/// Attributes of the refresh token cookie.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub domain: Option<String>,
    pub secure: bool,
}

pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub server_port: u16,
    pub server_host: String,
    pub jwt: JwtSettings,
    pub cookie: CookieSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_source<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = get("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let max_sessions = parse_or(&get, "MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?;
        if max_sessions == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_SESSIONS",
                value: "0".into(),
            });
        }

        let jwt = JwtSettings {
            private_key_path: get("JWT_PRIVATE_KEY_PATH")
                .unwrap_or_else(|| "certs/jwt-private.pem".to_string())
                .into(),
            public_key_path: get("JWT_PUBLIC_KEY_PATH")
                .unwrap_or_else(|| "certs/jwt-public.pem".to_string())
                .into(),
            algorithm: get("JWT_ALGORITHM").unwrap_or_else(|| "RS256".to_string()),
            access_token_expire_minutes: positive_minutes(
                &get,
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES,
            )?,
            refresh_token_expire_minutes: positive_minutes(
                &get,
                "REFRESH_TOKEN_EXPIRE_MINUTES",
                DEFAULT_REFRESH_TOKEN_EXPIRE_MINUTES,
            )?,
            max_sessions,
        };

        let cookie = CookieSettings {
            domain: get("COOKIE_DOMAIN").filter(|domain| !domain.is_empty()),
            secure: parse_or(&get, "COOKIE_SECURE", true)?,
        };

        Ok(Self {
            database_url,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            server_port: parse_or(&get, "SERVER_PORT", 8080)?,
            server_host: get("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            jwt,
            cookie,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or<F, T>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(value) => {
            let parsed = value.trim().parse();
            parsed.map_err(|_| ConfigError::Invalid { key, value })
        }
        None => Ok(default),
    }
}

fn positive_minutes<F>(get: &F, key: &'static str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let minutes = parse_or(get, key, default)?;
    // Beyond what a chrono duration can hold.
    if minutes <= 0 || chrono::Duration::try_minutes(minutes).is_none() {
        return Err(ConfigError::Invalid {
            key,
            value: minutes.to_string(),
        });
    }
    Ok(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_source(source(&[("DATABASE_URL", "postgres://test")])).unwrap();

        assert_eq!(config.database_url, "postgres://test");
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.jwt.algorithm, "RS256");
        assert_eq!(config.jwt.access_token_expire_minutes, 15);
        assert_eq!(config.jwt.refresh_token_expire_minutes, 10080);
        assert_eq!(config.jwt.max_sessions, 5);
        assert!(config.cookie.secure);
        assert!(config.cookie.domain.is_none());
    }

    #[test]
    fn test_config_custom_values() {
        let config = Config::from_source(source(&[
            ("DATABASE_URL", "postgres://test"),
            ("SERVER_PORT", "3000"),
            ("SERVER_HOST", "0.0.0.0"),
            ("MAX_SESSIONS", "3"),
            ("COOKIE_SECURE", "false"),
            ("COOKIE_DOMAIN", "example.com"),
            ("JWT_ALGORITHM", "ES256"),
        ]))
        .unwrap();

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.server_url(), "http://0.0.0.0:3000");
        assert_eq!(config.jwt.max_sessions, 3);
        assert_eq!(config.jwt.algorithm, "ES256");
        assert!(!config.cookie.secure);
        assert_eq!(config.cookie.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert_eq!(
            Config::from_source(source(&[])).err(),
            Some(ConfigError::Missing("DATABASE_URL"))
        );

        let zero_sessions =
            Config::from_source(source(&[("DATABASE_URL", "x"), ("MAX_SESSIONS", "0")]));
        assert!(matches!(
            zero_sessions,
            Err(ConfigError::Invalid { key: "MAX_SESSIONS", .. })
        ));

        let negative_ttl = Config::from_source(source(&[
            ("DATABASE_URL", "x"),
            ("ACCESS_TOKEN_EXPIRE_MINUTES", "-5"),
        ]));
        assert!(negative_ttl.is_err());

        let endless_ttl = Config::from_source(source(&[
            ("DATABASE_URL", "x"),
            ("REFRESH_TOKEN_EXPIRE_MINUTES", "999999999999999"),
        ]));
        assert_eq!(
            endless_ttl.err(),
            Some(ConfigError::Invalid {
                key: "REFRESH_TOKEN_EXPIRE_MINUTES",
                value: "999999999999999".into(),
            })
        );

        let bad_port = Config::from_source(source(&[("DATABASE_URL", "x"), ("SERVER_PORT", "http")]));
        assert!(bad_port.is_err());
    }
}
