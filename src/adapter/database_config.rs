use sqlx::mysql::MySqlPoolOptions;
use std::env;
use std::time::Duration;

/// データベース接続設定を管理する構造体
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
    /// 接続プールから接続を取得するまでの待ち時間（秒）
    pub acquire_timeout_seconds: u64,
}

/// 設定エラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// 環境変数を読み、未設定ならデフォルト値を使って型変換する
pub(crate) fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", key, e)))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// 0 を許さない設定値を検証する
pub(crate) fn ensure_positive<T>(key: &str, value: T) -> Result<T, ConfigError>
where
    T: Default + PartialEq,
{
    if value == T::default() {
        return Err(ConfigError::InvalidValue(format!("{} must be at least 1", key)));
    }
    Ok(value)
}

impl DatabaseConfig {
    /// 環境変数から設定を読み取る
    /// 環境変数が設定されていない場合はデフォルト値を使用
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or("DATABASE_HOST", "localhost"),
            port: parse_env("DATABASE_PORT", "3306")?,
            database: env_or("DATABASE_NAME", "tour_booking_db"),
            username: env_or("DATABASE_USER", "tour_booking_user"),
            password: env_or("DATABASE_PASSWORD", "tour_booking_password"),
            max_connections: ensure_positive(
                "DATABASE_MAX_CONNECTIONS",
                parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
            )?,
            acquire_timeout_seconds: ensure_positive(
                "DATABASE_ACQUIRE_TIMEOUT_SECONDS",
                parse_env("DATABASE_ACQUIRE_TIMEOUT_SECONDS", "5")?,
            )?,
        })
    }

    /// 接続プールの設定
    /// 取得待ちが時間切れになると sqlx::Error::PoolTimedOut になり、再試行可能なエラーとして扱われる
    pub fn pool_options(&self) -> MySqlPoolOptions {
        MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_seconds))
    }

    /// MySQL接続文字列を生成
    pub fn connection_string(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}
