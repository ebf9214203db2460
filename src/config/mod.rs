use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub visits: VisitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    /// Connection URL; ignored for postgres when `credentials` is set
    pub url: String,
    /// Discrete postgres credentials (DB_HOST, DB_USER, ...)
    #[serde(default)]
    pub credentials: Option<PostgresCredentials>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PostgresCredentials {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl std::fmt::Debug for PostgresCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret expected in the `api-secret` query parameter or body field
    pub api_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket peer address only
    None,
    /// Trust `Forwarded` / `X-Forwarded-For`
    #[default]
    Standard,
    /// Trust `CF-Connecting-IP`
    Cloudflare,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisitConfig {
    pub trusted_proxy_mode: TrustedProxyMode,
    /// Number of trusted proxy hops to skip from the right of X-Forwarded-For
    pub num_trusted_proxies: Option<usize>,
    /// Truncate stored IPs to /24 (IPv4) or /48 (IPv6)
    pub ip_anonymization: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let database = DatabaseConfig::from_lookup(&lookup)?;

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("PORT")
            .unwrap_or_else(|| "8000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let api_secret = var("API_SECRET").context("API_SECRET must be set")?;

        let trusted_proxy_mode = match var("TRUSTED_PROXY_MODE")
            .map(|v| v.to_lowercase())
            .as_deref()
        {
            None | Some("standard") => TrustedProxyMode::Standard,
            Some("none") => TrustedProxyMode::None,
            Some("cloudflare") => TrustedProxyMode::Cloudflare,
            Some(other) => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'standard'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::Standard
            }
        };

        let num_trusted_proxies = var("TRUSTED_PROXY_COUNT").and_then(|v| v.parse::<usize>().ok());

        let ip_anonymization = var("IP_ANONYMIZATION")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        Ok(Config {
            database,
            server: ServerConfig { host, port },
            auth: AuthConfig { api_secret },
            visits: VisitConfig {
                trusted_proxy_mode,
                num_trusted_proxies,
                ip_anonymization,
            },
        })
    }
}

impl DatabaseConfig {
    /// Database settings only; the admin CLI has no use for the API secret.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let database_url = var("DATABASE_URL");
        let db_host = var("DB_HOST");

        let explicit_backend = var("DATABASE_BACKEND").map(|v| v.to_lowercase());
        let backend = match explicit_backend.as_deref() {
            Some("postgres" | "postgresql") => DatabaseBackend::Postgres,
            Some("sqlite") => DatabaseBackend::Sqlite,
            Some(other) => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', inferring from connection settings. Supported values: sqlite, postgres"
                );
                infer_backend(database_url.as_deref(), db_host.is_some())
            }
            None => infer_backend(database_url.as_deref(), db_host.is_some()),
        };

        let credentials = match (&database_url, db_host) {
            (None, Some(host)) if matches!(backend, DatabaseBackend::Postgres) => {
                let port = var("DB_PORT")
                    .map(|p| p.parse::<u16>())
                    .transpose()
                    .context("DB_PORT must be a valid port number")?;
                let user = var("DB_USER").unwrap_or_else(|| "postgres".to_string());
                let database = var("DB_NAME").unwrap_or_else(|| user.clone());
                Some(PostgresCredentials {
                    host,
                    port,
                    user,
                    password: var("DB_PASSWORD"),
                    database,
                })
            }
            _ => None,
        };

        let url = database_url.unwrap_or_else(|| match backend {
            DatabaseBackend::Sqlite => "sqlite://./pixel_tracker.db".to_string(),
            DatabaseBackend::Postgres => "postgres://localhost/postgres".to_string(),
        });

        let max_connections = var("DATABASE_MAX_CONNECTIONS")
            .map(|v| v.parse::<u32>())
            .transpose()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?
            .unwrap_or(10)
            .max(1);

        Ok(DatabaseConfig {
            backend,
            url,
            credentials,
            max_connections,
        })
    }
}

fn infer_backend(url: Option<&str>, has_db_host: bool) -> DatabaseBackend {
    match url {
        Some(u) if u.starts_with("postgres") => DatabaseBackend::Postgres,
        Some(_) => DatabaseBackend::Sqlite,
        None if has_db_host => DatabaseBackend::Postgres,
        None => DatabaseBackend::Sqlite,
    }
}
