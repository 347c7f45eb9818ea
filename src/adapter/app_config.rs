use crate::adapter::database_config::{ensure_positive, parse_env, ConfigError};
use crate::application::service::BookingPolicy;
use std::env;
use std::time::Duration;

/// HTTPサーバーの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// 環境変数から設定を読み取る
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_env::<u16>("SERVER_PORT", "3000")?;
        Ok(Self { host, port })
    }

    /// バインドするアドレス
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 予約ポリシーの設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicyConfig {
    /// 仮押さえの決済期限（秒）
    pub payment_ttl_seconds: u64,
    /// 期限切れ掃除の実行間隔（秒）
    pub sweep_interval_seconds: u64,
}

impl BookingPolicyConfig {
    /// 環境変数から設定を読み取る
    /// いずれも0は不可
    pub fn from_env() -> Result<Self, ConfigError> {
        let payment_ttl_seconds = parse_env::<u64>("BOOKING_PAYMENT_TTL_SECONDS", "900")?;
        let sweep_interval_seconds = ensure_positive(
            "BOOKING_SWEEP_INTERVAL_SECONDS",
            parse_env::<u64>("BOOKING_SWEEP_INTERVAL_SECONDS", "60")?,
        )?;

        if payment_ttl_seconds == 0 || payment_ttl_seconds > i64::MAX as u64 / 1000 {
            return Err(ConfigError::InvalidValue(format!(
                "BOOKING_PAYMENT_TTL_SECONDS out of range: {}",
                payment_ttl_seconds
            )));
        }

        Ok(Self {
            payment_ttl_seconds,
            sweep_interval_seconds,
        })
    }

    /// アプリケーション層の予約ポリシーに変換する
    pub fn policy(&self) -> BookingPolicy {
        BookingPolicy {
            payment_ttl: chrono::Duration::seconds(self.payment_ttl_seconds as i64),
            ..BookingPolicy::default()
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}
