use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: Option<DatabaseConfig>,
    pub auth: AuthConfig,
    pub classifier: ClassifierConfig,
    pub dispatch: DispatchConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// Shared-secret JWT verification settings.
/// Tokens are minted by the identity service; this crate only verifies them.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: Option<String>,
    pub jwt_leeway: Duration,
}

/// External accident image classifier settings
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// When false, reports are only ever decided manually
    pub enabled: bool,
    /// Base URL of the ML server (the `/predict` path is appended)
    pub server_url: String,
    pub timeout: Duration,
    /// Strict lower bound: confidence must be greater than this to verify
    pub confidence_threshold: f64,
    /// Prediction label that counts as a positive accident detection
    pub positive_label: String,
    pub retry_interval: Duration,
    /// Reports younger than this are left to the intake task
    pub retry_min_age: Duration,
    pub max_attempts: i32,
    pub retry_batch_size: i64,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub default_zone_id: String,
    /// Per-connection outbound queue size; events beyond it are dropped
    pub outbox_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        Ok(Config {
            app: AppConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            classifier: ClassifierConfig::from_env()?,
            dispatch: DispatchConfig::from_env()?,
            swagger: SwaggerConfig::from_env()?,
        })
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = parse_origins(
            &env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()),
        );

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    /// Returns `None` when `DATABASE_URL` is unset; the server then runs on
    /// the in-memory store.
    pub fn from_env() -> Result<Option<Self>, String> {
        let url = match env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()) {
            Some(url) => url,
            None => return Ok(None),
        };

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MAX_CONNECTIONS must be a valid number".to_string())?;

        let min_connections = env::var("DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MIN_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MIN_CONNECTIONS must be a valid number".to_string())?;

        let acquire_timeout_secs = env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_ACQUIRE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_ACQUIRE_TIMEOUT_SECS must be a valid number".to_string())?;

        let idle_timeout_secs = env::var("DB_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_IDLE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_IDLE_TIMEOUT_SECS must be a valid number".to_string())?;

        let max_lifetime_secs = env::var("DB_MAX_LIFETIME_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_LIFETIME_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_MAX_LIFETIME_SECS must be a valid number".to_string())?;

        Ok(Some(Self {
            url,
            max_connections,
            min_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
        }))
    }
}

impl AuthConfig {
    const DEFAULT_JWT_LEEWAY_SECS: u64 = 60;

    pub fn from_env() -> Result<Self, String> {
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "JWT_SECRET environment variable is required".to_string())?;

        let issuer = env::var("JWT_ISSUER").ok().filter(|s| !s.is_empty());

        let jwt_leeway_secs = env::var("JWT_LEEWAY")
            .unwrap_or_else(|_| Self::DEFAULT_JWT_LEEWAY_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "JWT_LEEWAY must be a valid number".to_string())?;

        Ok(Self {
            jwt_secret,
            issuer,
            jwt_leeway: Duration::from_secs(jwt_leeway_secs),
        })
    }
}

impl ClassifierConfig {
    const DEFAULT_SERVER_URL: &'static str = "http://127.0.0.1:8000";
    const DEFAULT_TIMEOUT_MS: u64 = 5000;
    const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;
    const DEFAULT_POSITIVE_LABEL: &'static str = "accident";
    const DEFAULT_RETRY_INTERVAL_SECS: u64 = 60;
    const DEFAULT_RETRY_MIN_AGE_SECS: u64 = 30;
    const DEFAULT_MAX_ATTEMPTS: i32 = 3;
    const DEFAULT_RETRY_BATCH_SIZE: i64 = 10;

    pub fn from_env() -> Result<Self, String> {
        let enabled = parse_bool(&env::var("ML_ENABLED").unwrap_or_else(|_| "true".to_string()))
            .ok_or_else(|| "ML_ENABLED must be true or false".to_string())?;

        let server_url = env::var("ML_SERVER_URL")
            .unwrap_or_else(|_| Self::DEFAULT_SERVER_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let timeout_ms = env::var("ML_TIMEOUT_MS")
            .unwrap_or_else(|_| Self::DEFAULT_TIMEOUT_MS.to_string())
            .parse::<u64>()
            .map_err(|_| "ML_TIMEOUT_MS must be a valid number".to_string())?;

        let confidence_threshold = env::var("ML_CONFIDENCE_THRESHOLD")
            .unwrap_or_else(|_| Self::DEFAULT_CONFIDENCE_THRESHOLD.to_string())
            .parse::<f64>()
            .map_err(|_| "ML_CONFIDENCE_THRESHOLD must be a valid number".to_string())?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err("ML_CONFIDENCE_THRESHOLD must be between 0 and 1".to_string());
        }

        let positive_label = env::var("ML_POSITIVE_LABEL")
            .unwrap_or_else(|_| Self::DEFAULT_POSITIVE_LABEL.to_string());

        let retry_interval_secs = env::var("ML_RETRY_INTERVAL_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_RETRY_INTERVAL_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "ML_RETRY_INTERVAL_SECS must be a valid number".to_string())?;

        let retry_min_age_secs = env::var("ML_RETRY_MIN_AGE_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_RETRY_MIN_AGE_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "ML_RETRY_MIN_AGE_SECS must be a valid number".to_string())?;

        let max_attempts = env::var("ML_MAX_ATTEMPTS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_ATTEMPTS.to_string())
            .parse::<i32>()
            .map_err(|_| "ML_MAX_ATTEMPTS must be a valid number".to_string())?;

        let retry_batch_size = env::var("ML_RETRY_BATCH_SIZE")
            .unwrap_or_else(|_| Self::DEFAULT_RETRY_BATCH_SIZE.to_string())
            .parse::<i64>()
            .map_err(|_| "ML_RETRY_BATCH_SIZE must be a valid number".to_string())?;

        Ok(Self {
            enabled,
            server_url,
            timeout: Duration::from_millis(timeout_ms),
            confidence_threshold,
            positive_label,
            retry_interval: Duration::from_secs(retry_interval_secs.max(1)),
            retry_min_age: Duration::from_secs(retry_min_age_secs),
            max_attempts,
            retry_batch_size,
        })
    }

    pub fn predict_url(&self) -> String {
        format!("{}/predict", self.server_url)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_url: Self::DEFAULT_SERVER_URL.to_string(),
            timeout: Duration::from_millis(Self::DEFAULT_TIMEOUT_MS),
            confidence_threshold: Self::DEFAULT_CONFIDENCE_THRESHOLD,
            positive_label: Self::DEFAULT_POSITIVE_LABEL.to_string(),
            retry_interval: Duration::from_secs(Self::DEFAULT_RETRY_INTERVAL_SECS),
            retry_min_age: Duration::from_secs(Self::DEFAULT_RETRY_MIN_AGE_SECS),
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            retry_batch_size: Self::DEFAULT_RETRY_BATCH_SIZE,
        }
    }
}

impl DispatchConfig {
    const DEFAULT_ZONE_ID: &'static str = "default";
    const DEFAULT_OUTBOX_CAPACITY: usize = 64;

    pub fn from_env() -> Result<Self, String> {
        let default_zone_id =
            env::var("DEFAULT_ZONE_ID").unwrap_or_else(|_| Self::DEFAULT_ZONE_ID.to_string());
        if !crate::shared::validation::ZONE_ID_REGEX.is_match(&default_zone_id) {
            return Err(format!("DEFAULT_ZONE_ID is not a valid zone id: {}", default_zone_id));
        }

        let outbox_capacity = env::var("DISPATCH_OUTBOX_CAPACITY")
            .unwrap_or_else(|_| Self::DEFAULT_OUTBOX_CAPACITY.to_string())
            .parse::<usize>()
            .map_err(|_| "DISPATCH_OUTBOX_CAPACITY must be a valid number".to_string())?;

        Ok(Self {
            default_zone_id,
            outbox_capacity: outbox_capacity.max(1),
        })
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_zone_id: Self::DEFAULT_ZONE_ID.to_string(),
            outbox_capacity: Self::DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Result<Self, String> {
        // Only use credentials if they are non-empty
        let username = env::var("SWAGGER_USERNAME").ok().filter(|s| !s.is_empty());
        let password = env::var("SWAGGER_PASSWORD").ok().filter(|s| !s.is_empty());
        let title =
            env::var("SWAGGER_TITLE").unwrap_or_else(|_| "Accident Dispatch API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION")
            .unwrap_or_else(|_| "Accident reporting, verification and ambulance dispatch".to_string());

        Ok(Self {
            username,
            password,
            title,
            version,
            description,
        })
    }

    /// Returns credentials in "username:password" format if auth is enabled
    pub fn credentials(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(format!("{}:{}", user, pass)),
            _ => None,
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins_skips_blanks() {
        let origins = parse_origins("http://localhost:5173, ,https://ops.example.org");
        assert_eq!(
            origins,
            vec![
                "http://localhost:5173".to_string(),
                "https://ops.example.org".to_string()
            ]
        );
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_swagger_credentials_require_both_parts() {
        let mut swagger = SwaggerConfig {
            username: Some("ops".to_string()),
            password: None,
            title: String::new(),
            version: String::new(),
            description: String::new(),
        };
        assert!(swagger.credentials().is_none());

        swagger.password = Some("secret".to_string());
        assert_eq!(swagger.credentials().as_deref(), Some("ops:secret"));
    }

    #[test]
    fn test_predict_url_appends_path() {
        let config = ClassifierConfig {
            server_url: "http://ml.internal:8000".to_string(),
            ..ClassifierConfig::default()
        };
        assert_eq!(config.predict_url(), "http://ml.internal:8000/predict");
    }
}
