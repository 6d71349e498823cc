use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub otp_ttl_secs: u64,
    pub store_timeout_ms: u64,
    pub auction_cache_ttl_secs: u64,
    pub player_cache_ttl_secs: u64,
    pub profile_cache_ttl_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub mail_relay_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // JWT_EXPIRATION 以小时为单位，兼容 "24h" 写法
        let jwt_expiration_hours: u64 = match env::var("JWT_EXPIRATION") {
            Ok(raw) => parse_number("JWT_EXPIRATION", raw.trim_end_matches('h'))?,
            Err(_) => 24,
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_secs: hours_to_secs("JWT_EXPIRATION", jwt_expiration_hours)?,
            otp_ttl_secs: optional("OTP_TTL_SECS", 300)?,
            store_timeout_ms: optional("STORE_TIMEOUT_MS", 5000)?,
            auction_cache_ttl_secs: optional("AUCTION_CACHE_TTL_SECS", 600)?,
            player_cache_ttl_secs: optional("PLAYER_CACHE_TTL_SECS", 300)?,
            profile_cache_ttl_secs: optional("PROFILE_CACHE_TTL_SECS", 3600)?,
            rate_limit_window_secs: optional("RATE_LIMIT_WINDOW", 60)?,
            rate_limit_requests: optional("RATE_LIMIT_REQUESTS", 20)?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: optional("SERVER_PORT", 8080)?,
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api/v1".into()),
            mail_relay_url: env::var("MAIL_RELAY_URL").ok().filter(|s| !s.is_empty()),
        })
    }

    /// 本地开发与测试使用的默认配置，不读取环境变量
    pub fn for_tests(jwt_secret: &str) -> Self {
        Config {
            database_url: String::new(),
            redis_url: String::new(),
            jwt_secret: jwt_secret.to_string(),
            jwt_expiration_secs: 24 * 3600,
            otp_ttl_secs: 300,
            store_timeout_ms: 2000,
            auction_cache_ttl_secs: 600,
            player_cache_ttl_secs: 300,
            profile_cache_ttl_secs: 3600,
            rate_limit_window_secs: 60,
            rate_limit_requests: 1000,
            server_host: "127.0.0.1".into(),
            server_port: 0,
            api_base_uri: "/api/v1".into(),
            mail_relay_url: None,
        }
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn otp_ttl(&self) -> Duration {
        Duration::from_secs(self.otp_ttl_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn auction_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.auction_cache_ttl_secs)
    }

    pub fn player_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.player_cache_ttl_secs)
    }

    pub fn profile_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_cache_ttl_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn optional<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => parse_number(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn hours_to_secs(key: &'static str, hours: u64) -> Result<u64, ConfigError> {
    hours.checked_mul(3600).ok_or_else(|| ConfigError::Invalid {
        key,
        value: format!("{hours}h"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_rejects_garbage() {
        let err = parse_number::<u64>("OTP_TTL_SECS", "five").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "OTP_TTL_SECS", .. }));
        assert_eq!(parse_number::<u64>("OTP_TTL_SECS", " 120 ").unwrap(), 120);
    }

    #[test]
    fn expiration_hours_that_overflow_are_rejected() {
        assert_eq!(hours_to_secs("JWT_EXPIRATION", 24).unwrap(), 86_400);
        let err = hours_to_secs("JWT_EXPIRATION", u64::MAX / 1000).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JWT_EXPIRATION", .. }));
    }

    #[test]
    fn test_config_durations() {
        let config = Config::for_tests("secret");
        assert_eq!(config.otp_ttl(), Duration::from_secs(300));
        assert_eq!(config.store_timeout(), Duration::from_millis(2000));
        assert_eq!(config.jwt_expiration(), Duration::from_secs(86_400));
    }
}
