/// Configuration management for the API server
///
/// Configuration comes from the process environment (a `.env` file is loaded
/// first when present) through the `config` crate's environment source.
///
/// # Environment Variables
///
/// - `APP_ENV`: `development` (default), `test` or `production`
/// - `API_HOST` / `API_PORT`: Bind address (default: 0.0.0.0:8080)
/// - `APP_BASE_URL`: Public origin used for OAuth redirects
/// - `CORS_ORIGINS`: Comma-separated origins, `*` for permissive
/// - `DATABASE_URL`: PostgreSQL connection string (not needed when `APP_ENV=test`)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `SESSION_SECRET`: Session signing key, at least 32 characters
/// - `SESSION_MAX_AGE_DAYS`: Session lifetime (default: 30)
/// - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`: OAuth client
/// - `REDIS_URL`: Enables cache, jobs, realtime and distributed rate limits
/// - `REALTIME_APP_KEY` / `REALTIME_APP_SECRET`: Private channel signing
/// - `SENTRY_DSN`: Enables error tracking
///
/// # Example
///
/// ```no_run
/// use calendar_agent_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};

/// Minimum session secret length
pub const MIN_SECRET_LEN: usize = 32;

/// Longest accepted session lifetime, in days
pub const MAX_SESSION_AGE_DAYS: i64 = 3650;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub oauth: OAuthConfig,

    /// Redis connection URL; None runs the Redis-backed adapters disabled
    pub redis_url: Option<String>,

    pub realtime: Option<RealtimeConfig>,

    /// Error tracking DSN
    pub monitoring_dsn: Option<String>,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Deployment environment name
    pub app_env: String,

    /// Enables HSTS, secure cookies and hides development tokens
    pub production: bool,

    /// Allowed CORS origins (`*` = permissive)
    pub cors_origins: Vec<String>,

    /// Public origin, e.g. `https://app.example.com`
    pub base_url: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL (empty when running on the in-memory store)
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Signs session tokens and account deletion confirmations
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    pub max_age_days: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub google_client_id: String,
    pub google_client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub app_key: String,
    pub app_secret: String,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `SESSION_SECRET` is missing or shorter than 32 characters
    /// - `DATABASE_URL` is missing outside the test environment
    /// - A numeric variable does not parse
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let env = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        Self::from_source(&env)
    }

    fn from_source(env: &config::Config) -> anyhow::Result<Self> {
        let optional = |key: &str| -> Option<String> {
            env.get_string(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let app_env = optional("app_env").unwrap_or_else(|| "development".to_string());
        let production = app_env == "production";

        let host = optional("api_host").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = optional("api_port")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()?;

        let base_url = optional("app_base_url")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let cors_origins = optional("cors_origins")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        let database_url = match optional("database_url") {
            Some(url) => url,
            None if app_env == "test" => String::new(),
            None => anyhow::bail!("DATABASE_URL environment variable is required"),
        };

        let max_connections = optional("database_max_connections")
            .unwrap_or_else(|| "10".to_string())
            .parse::<u32>()?;

        let secret = optional("session_secret")
            .ok_or_else(|| anyhow::anyhow!("SESSION_SECRET environment variable is required"))?;

        if secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("SESSION_SECRET must be at least 32 characters long");
        }

        let max_age_days = optional("session_max_age_days")
            .unwrap_or_else(|| "30".to_string())
            .parse::<i64>()?;

        if max_age_days <= 0 {
            anyhow::bail!("SESSION_MAX_AGE_DAYS must be positive");
        }
        if max_age_days > MAX_SESSION_AGE_DAYS {
            anyhow::bail!(
                "SESSION_MAX_AGE_DAYS must be at most {}",
                MAX_SESSION_AGE_DAYS
            );
        }

        let realtime = match (optional("realtime_app_key"), optional("realtime_app_secret")) {
            (Some(app_key), Some(app_secret)) => Some(RealtimeConfig {
                app_key,
                app_secret,
            }),
            _ => None,
        };

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                app_env,
                production,
                cors_origins,
                base_url,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            session: SessionConfig {
                secret,
                max_age_days,
            },
            oauth: OAuthConfig {
                google_client_id: optional("google_client_id").unwrap_or_default(),
                google_client_secret: optional("google_client_secret").unwrap_or_default(),
            },
            redis_url: optional("redis_url"),
            realtime,
            monitoring_dsn: optional("sentry_dsn"),
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether the server runs on the in-memory repository
    pub fn is_test(&self) -> bool {
        self.api.app_env == "test"
    }

    pub fn session_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.session.max_age_days)
    }

    /// Configuration for router tests: in-memory store, no optional services
    pub fn for_test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                app_env: "test".to_string(),
                production: false,
                cors_origins: vec!["*".to_string()],
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
            },
            session: SessionConfig {
                secret: "test-secret-key-at-least-32-bytes-long".to_string(),
                max_age_days: 30,
            },
            oauth: OAuthConfig::default(),
            redis_url: None,
            realtime: None,
            monitoring_dsn: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(vars: &[(&str, &str)]) -> config::Config {
        let mut builder = config::Config::builder();
        for (key, value) in vars {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap()
    }

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_bind_address() {
        let config = Config::for_test();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_source(&source(&[
            ("database_url", "postgresql://localhost/calendar"),
            ("session_secret", SECRET),
        ]))
        .unwrap();

        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.app_env, "development");
        assert!(!config.api.production);
        assert_eq!(config.api.cors_origins, vec!["*"]);
        assert_eq!(config.session.max_age_days, 30);
        assert!(config.redis_url.is_none());
        assert!(config.realtime.is_none());
    }

    #[test]
    fn test_short_secret_rejected() {
        let result = Config::from_source(&source(&[
            ("database_url", "postgresql://localhost/calendar"),
            ("session_secret", "too-short"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_session_max_age_bounds() {
        let with_days = |days: &str| {
            Config::from_source(&source(&[
                ("database_url", "postgresql://localhost/calendar"),
                ("session_secret", SECRET),
                ("session_max_age_days", days),
            ]))
        };

        assert!(with_days("0").is_err());
        assert!(with_days("-1").is_err());
        assert!(with_days("3651").is_err());
        assert!(with_days("9223372036854775807").is_err());

        let config = with_days("3650").unwrap();
        assert_eq!(config.session_max_age(), chrono::Duration::days(3650));
    }

    #[test]
    fn test_database_url_optional_in_test_env() {
        let config = Config::from_source(&source(&[
            ("app_env", "test"),
            ("session_secret", SECRET),
        ]))
        .unwrap();
        assert!(config.is_test());
        assert!(config.database.url.is_empty());

        let result = Config::from_source(&source(&[("session_secret", SECRET)]));
        assert!(result.is_err());
    }

    #[test]
    fn test_production_and_origins() {
        let config = Config::from_source(&source(&[
            ("app_env", "production"),
            ("database_url", "postgresql://db/calendar"),
            ("session_secret", SECRET),
            ("cors_origins", "https://app.example.com, https://www.example.com"),
            ("app_base_url", "https://app.example.com/"),
            ("realtime_app_key", "key"),
            ("realtime_app_secret", "secret"),
        ]))
        .unwrap();

        assert!(config.api.production);
        assert_eq!(config.api.cors_origins.len(), 2);
        assert_eq!(config.api.base_url, "https://app.example.com");
        assert_eq!(config.realtime.unwrap().app_key, "key");
    }
}
