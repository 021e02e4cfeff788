use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub filter: FilterConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub blob: BlobConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Empty means any origin is accepted.
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub max_limit: i64,
    pub debug_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection string; takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_rate_limiting: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
    pub max_request_size_bytes: usize,
    /// Count rate limits against `X-Forwarded-For` instead of the socket
    /// peer. Only for deployments behind a proxy that overwrites the header.
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_access_secret: String,
    pub jwt_access_expires_secs: u64,
    pub jwt_refresh_secret: String,
    pub jwt_refresh_expires_secs: u64,
    pub aes_secret: String,
    pub bcrypt_cost: u32,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    pub cloudinary_name: String,
    pub cloudinary_api_key: String,
    pub cloudinary_api_secret: String,
}

impl BlobConfig {
    pub fn is_configured(&self) -> bool {
        !self.cloudinary_name.is_empty()
            && !self.cloudinary_api_key.is_empty()
            && !self.cloudinary_api_secret.is_empty()
    }
}

/// Per-endpoint page sizes and caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub covers: i64,
    pub insights: i64,
    pub users: i64,
    pub trending: i64,
    pub random: i64,
}

const FOURTEEN_DAYS: u64 = 14 * 24 * 60 * 60;

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup so tests do not
    /// have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").or_else(|| lookup("NODE_ENV")).as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(lookup)
    }

    fn with_overrides<F>(mut self, get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(v) = get("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Some(v) = get("CORS_ORIGINS") {
            self.server.cors_origins = split_list(&v);
        }

        // Filter
        if let Some(v) = get("FILTER_MAX_LIMIT") {
            self.filter.max_limit = v.parse().unwrap_or(self.filter.max_limit);
        }
        if let Some(v) = get("FILTER_DEBUG_LOGGING") {
            self.filter.debug_logging = v.parse().unwrap_or(self.filter.debug_logging);
        }

        // Database
        if let Some(v) = get("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.database.url = Some(v);
        }
        if let Some(v) = get("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = get("DB_PORT") {
            self.database.port = v.parse().unwrap_or(self.database.port);
        }
        if let Some(v) = get("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = get("DB_PWD") {
            self.database.password = v;
        }
        if let Some(v) = get("DB_DATABASE") {
            self.database.name = v;
        }
        if let Some(v) = get("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Some(v) = get("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Some(v) = get("DATABASE_RUN_MIGRATIONS") {
            self.database.run_migrations = v.parse().unwrap_or(self.database.run_migrations);
        }

        // API
        if let Some(v) = get("API_ENABLE_RATE_LIMITING") {
            self.api.enable_rate_limiting = v.parse().unwrap_or(self.api.enable_rate_limiting);
        }
        if let Some(v) = get("RATE_LIMIT_AMOUNT") {
            self.api.rate_limit_requests = v.parse().unwrap_or(self.api.rate_limit_requests);
        }
        if let Some(v) = get("RATE_LIMIT_MIN") {
            if let Some(secs) = v.parse::<u64>().ok().and_then(|minutes| minutes.checked_mul(60)) {
                self.api.rate_limit_window_secs = secs;
            }
        }
        if let Some(v) = get("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Some(v) = get("TRUST_PROXY") {
            self.api.trust_proxy = v.parse().unwrap_or(self.api.trust_proxy);
        }

        // Security
        if let Some(v) = get("JWT_ACCESS_SECRET") {
            self.security.jwt_access_secret = v;
        }
        if let Some(v) = get("JWT_ACCESS_EXPIRES_IN") {
            self.security.jwt_access_expires_secs =
                parse_duration_secs(&v).unwrap_or(self.security.jwt_access_expires_secs);
        }
        if let Some(v) = get("JWT_REFRESH_SECRET") {
            self.security.jwt_refresh_secret = v;
        }
        if let Some(v) = get("JWT_REFRESH_EXPIRES_IN") {
            self.security.jwt_refresh_expires_secs =
                parse_duration_secs(&v).unwrap_or(self.security.jwt_refresh_expires_secs);
        }
        if let Some(v) = get("AES_SECRET") {
            self.security.aes_secret = v;
        }
        if let Some(v) = get("BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }

        // Blob store
        if let Some(v) = get("CLOUDINARY_NAME") {
            self.blob.cloudinary_name = v;
        }
        if let Some(v) = get("CLOUDINARY_API_KEY") {
            self.blob.cloudinary_api_key = v;
        }
        if let Some(v) = get("CLOUDINARY_API_SECRET") {
            self.blob.cloudinary_api_secret = v;
        }

        self
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self.environment, Environment::Development)
    }

    /// Connection string for the primary database.
    pub fn database_url(&self) -> Result<String, url::ParseError> {
        if let Some(url) = &self.database.url {
            return Ok(url.clone());
        }

        let mut url = url::Url::parse("postgres://localhost")?;
        // set_* on a postgres URL only fails for cannot-be-a-base URLs, which this is not
        let _ = url.set_host(Some(&self.database.host));
        let _ = url.set_port(Some(self.database.port));
        let _ = url.set_username(&self.database.user);
        if !self.database.password.is_empty() {
            let _ = url.set_password(Some(&self.database.password));
        }
        url.set_path(&format!("/{}", self.database.name));
        Ok(url.into())
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 5001,
                cors_origins: vec![],
            },
            filter: FilterConfig {
                max_limit: 1000,
                debug_logging: true,
            },
            database: DatabaseConfig {
                url: None,
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: String::new(),
                name: "archon".to_string(),
                max_connections: 5,
                connection_timeout: 30,
                run_migrations: true,
            },
            api: ApiConfig {
                enable_rate_limiting: false,
                rate_limit_requests: 100,
                rate_limit_window_secs: 5 * 60,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                trust_proxy: false,
            },
            security: SecurityConfig {
                jwt_access_secret: "dev-access-secret".to_string(),
                jwt_access_expires_secs: FOURTEEN_DAYS,
                jwt_refresh_secret: "dev-refresh-secret".to_string(),
                jwt_refresh_expires_secs: FOURTEEN_DAYS,
                aes_secret: String::new(),
                bcrypt_cost: 12,
                secure_cookies: false,
            },
            blob: BlobConfig::empty(),
            limits: LimitsConfig::default(),
        }
    }

    fn staging() -> Self {
        let mut config = Self::production();
        config.environment = Environment::Staging;
        config.filter.max_limit = 500;
        config
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 5001,
                cors_origins: vec![],
            },
            filter: FilterConfig {
                max_limit: 100,
                debug_logging: false,
            },
            database: DatabaseConfig {
                url: None,
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: String::new(),
                name: "archon".to_string(),
                max_connections: 5,
                connection_timeout: 5,
                run_migrations: false,
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                rate_limit_requests: 100,
                rate_limit_window_secs: 5 * 60,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
                trust_proxy: false,
            },
            security: SecurityConfig {
                jwt_access_secret: String::new(),
                jwt_access_expires_secs: FOURTEEN_DAYS,
                jwt_refresh_secret: String::new(),
                jwt_refresh_expires_secs: FOURTEEN_DAYS,
                aes_secret: String::new(),
                bcrypt_cost: 12,
                secure_cookies: true,
            },
            blob: BlobConfig::empty(),
            limits: LimitsConfig::default(),
        }
    }
}

impl BlobConfig {
    fn empty() -> Self {
        Self {
            cloudinary_name: String::new(),
            cloudinary_api_key: String::new(),
            cloudinary_api_secret: String::new(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            covers: 10,
            insights: 10,
            users: 5,
            trending: 5,
            random: 6,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses `30s`, `15m`, `12h`, `14d` or a bare number of seconds.
pub fn parse_duration_secs(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let (number, multiplier) = match value.chars().last()? {
        's' => (&value[..value.len() - 1], 1),
        'm' => (&value[..value.len() - 1], 60),
        'h' => (&value[..value.len() - 1], 60 * 60),
        'd' => (&value[..value.len() - 1], 24 * 60 * 60),
        _ => (value, 1),
    };
    number.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}
