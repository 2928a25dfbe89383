use std::str::FromStr;

pub const DEFAULT_JWT_SECRET: &str = "stayvista-dev-secret-change-in-production";

/// Trending ranking knobs.
#[derive(Debug, Clone, Copy)]
pub struct TrendingConfig {
    pub window_months: u32,
    pub limit: usize,
}

impl Default for TrendingConfig {
    fn default() -> Self {
        Self {
            window_months: 3,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub production: bool,
    pub level: String,
    pub dir: String,
}

/// Server configuration read from the environment (after `dotenvy`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub blob_dir: String,
    pub public_base_url: String,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub bcrypt_cost: u32,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub allowed_origins: Vec<String>,
    pub trending: TrendingConfig,
    pub log: LogConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        let host = env_string("HOST", "127.0.0.1");
        let port = env_or("PORT", 3001);
        let production = env_string("ENVIRONMENT", "development") == "production";

        Self {
            public_base_url: env_string("PUBLIC_BASE_URL", &format!("http://{}:{}", host, port)),
            host,
            port,
            data_dir: env_string("DATA_DIR", "stayvista_data"),
            blob_dir: env_string("BLOB_DIR", "stayvista_blobs"),
            jwt_secret: env_string("JWT_SECRET", DEFAULT_JWT_SECRET),
            token_ttl_secs: env_or("TOKEN_TTL_SECS", 3600),
            bcrypt_cost: env_or("BCRYPT_COST", bcrypt::DEFAULT_COST),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 5 * 1024 * 1024),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| vec!["http://localhost:3000".to_string()]),
            trending: TrendingConfig {
                window_months: env_or("TRENDING_WINDOW_MONTHS", 3),
                limit: env_or("TRENDING_LIMIT", 10),
            },
            log: LogConfig {
                production,
                level: env_string("LOG_LEVEL", if production { "info" } else { "debug" }),
                dir: env_string("LOG_DIR", "logs"),
            },
        }
    }

    /// Refuses production startup with the built-in JWT secret.
    pub fn validate(&self) -> Result<(), String> {
        if self.log.production && self.jwt_secret == DEFAULT_JWT_SECRET {
            return Err("JWT_SECRET must be set to a unique value in production".to_string());
        }
        if self.trending.limit == 0 {
            return Err("TRENDING_LIMIT must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_has_sane_defaults() {
        let config = Config::from_env();
        assert!(config.token_ttl_secs >= 1);
        assert!(config.max_upload_bytes >= 1);
        assert!(!config.data_dir.is_empty());
        assert!(!config.public_base_url.is_empty());
    }

    #[test]
    fn test_validate_rejects_default_secret_in_production() {
        let mut config = Config::from_env();
        config.log.production = true;
        config.jwt_secret = DEFAULT_JWT_SECRET.to_string();
        assert!(config.validate().is_err());

        config.jwt_secret = "something-long-and-random".to_string();
        config.trending.limit = 10;
        assert!(config.validate().is_ok());
    }
}
