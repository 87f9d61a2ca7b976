use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub integrations: IntegrationsConfig,
    pub activity: ActivityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Which `Store` implementation backs the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    #[serde(skip_serializing)]
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub public_base_url: String,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub session_expiry_hours: u64,
    pub session_cookie_name: String,
    pub privileged_operators: OperatorAllowList,
    pub invite_expiry_hours: u64,
    pub password_iterations: u32,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    pub cesium_ion_api_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    pub queue_capacity: usize,
}

/// Accounts that bypass plan limits and may use the operator endpoints.
/// Emails are stored lowercased and compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAllowList(Vec<String>);

impl OperatorAllowList {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = emails
            .into_iter()
            .map(|e| e.as_ref().trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        list.sort();
        list.dedup();
        Self(list)
    }

    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn contains(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.0.iter().any(|e| *e == email)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("SCENEHUB_STORE") {
            match v.to_lowercase().as_str() {
                "memory" => self.database.backend = StoreBackend::Memory,
                "postgres" | "pg" => self.database.backend = StoreBackend::Postgres,
                other => tracing::warn!("Ignoring unknown SCENEHUB_STORE value '{}'", other),
            }
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // API overrides
        if let Some(port) = env::var("SCENEHUB_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("PUBLIC_BASE_URL") {
            self.api.public_base_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SESSION_EXPIRY_HOURS") {
            self.security.session_expiry_hours = v.parse().unwrap_or(self.security.session_expiry_hours);
        }
        if let Ok(v) = env::var("SESSION_COOKIE_NAME") {
            self.security.session_cookie_name = v;
        }
        if let Ok(v) = env::var("PRIVILEGED_OPERATORS") {
            self.security.privileged_operators = OperatorAllowList::parse(&v);
        }
        if let Ok(v) = env::var("INVITE_EXPIRY_HOURS") {
            self.security.invite_expiry_hours = v.parse().unwrap_or(self.security.invite_expiry_hours);
        }
        if let Ok(v) = env::var("PASSWORD_ITERATIONS") {
            self.security.password_iterations = v.parse().unwrap_or(self.security.password_iterations);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Integration overrides
        if let Ok(v) = env::var("CESIUM_ION_API_URL") {
            self.integrations.cesium_ion_api_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("INTEGRATION_REQUEST_TIMEOUT_SECS") {
            self.integrations.request_timeout_secs =
                v.parse().unwrap_or(self.integrations.request_timeout_secs);
        }

        if let Ok(v) = env::var("ACTIVITY_QUEUE_CAPACITY") {
            self.activity.queue_capacity = v.parse().unwrap_or(self.activity.queue_capacity);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            api: ApiConfig {
                port: 3000,
                public_base_url: "http://localhost:3000".to_string(),
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                default_page_size: 20,
                max_page_size: 200,
            },
            security: SecurityConfig {
                jwt_secret: "scenehub-development-secret".to_string(),
                session_expiry_hours: 24 * 7,
                session_cookie_name: "scenehub_session".to_string(),
                privileged_operators: OperatorAllowList::default(),
                invite_expiry_hours: 24 * 7,
                password_iterations: 10_000,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            integrations: IntegrationsConfig {
                cesium_ion_api_url: "https://api.cesium.com".to_string(),
                request_timeout_secs: 30,
            },
            activity: ActivityConfig { queue_capacity: 1024 },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            api: ApiConfig {
                port: 3000,
                public_base_url: "https://staging.scenehub.app".to_string(),
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
                default_page_size: 20,
                max_page_size: 100,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                session_expiry_hours: 24,
                session_cookie_name: "scenehub_session".to_string(),
                privileged_operators: OperatorAllowList::default(),
                invite_expiry_hours: 24 * 7,
                password_iterations: 310_000,
                cors_origins: vec!["https://staging.scenehub.app".to_string()],
            },
            integrations: IntegrationsConfig {
                cesium_ion_api_url: "https://api.cesium.com".to_string(),
                request_timeout_secs: 20,
            },
            activity: ActivityConfig { queue_capacity: 4096 },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            api: ApiConfig {
                port: 3000,
                public_base_url: "https://scenehub.app".to_string(),
                enable_request_logging: false,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
                default_page_size: 20,
                max_page_size: 100,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                session_expiry_hours: 24,
                session_cookie_name: "scenehub_session".to_string(),
                privileged_operators: OperatorAllowList::default(),
                invite_expiry_hours: 24 * 3,
                password_iterations: 600_000,
                cors_origins: vec!["https://scenehub.app".to_string()],
            },
            integrations: IntegrationsConfig {
                cesium_ion_api_url: "https://api.cesium.com".to_string(),
                request_timeout_secs: 15,
            },
            activity: ActivityConfig { queue_capacity: 8192 },
        }
    }
}

// Process-wide config used by the binaries at startup; request handling
// reads the copy carried in `AppState`.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
