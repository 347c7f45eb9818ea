use super::booking_ledger::column;
use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{Currency, DealState, GroupSize, Money, TourCapacityConfig, TourId};
use crate::domain::port::{RepositoryError, TourCatalog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};
use tracing::{error, warn};

/// MySQLツアーカタログ
/// カタログが管理するツアー表から定員・価格設定を読み取る
#[derive(Clone)]
pub struct MySqlTourCatalog {
    pool: Pool<MySql>,
}

impl MySqlTourCatalog {
    /// 新しいMySQLツアーカタログを作成
    ///
    /// # Arguments
    /// * `pool` - MySQLコネクションプール
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

fn invalid_config(tour_id: TourId, e: impl std::fmt::Display) -> RepositoryError {
    error!(tour_id = %tour_id, error = %e, "ツアー設定が不正です");
    RepositoryError::FetchFailed(format!("ツアー設定が不正です ({}): {}", tour_id, e))
}

#[async_trait]
impl TourCatalog for MySqlTourCatalog {
    async fn find_config(
        &self,
        tour_id: TourId,
    ) -> Result<Option<TourCapacityConfig>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT min_group, max_group, base_price, currency,
                   is_drop_in, is_early_bird, is_pay_what_you_want, early_bird_floor_price
            FROM tours
            WHERE id = ?
            "#,
        )
        .bind(tour_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("ツアーの取得に失敗しました: {}", e)))
        .map_err(RepositoryError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let start_times: Vec<DateTime<Utc>> = sqlx::query(
            "SELECT start_time FROM tour_start_times WHERE tour_id = ? ORDER BY start_time ASC",
        )
        .bind(tour_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("開始日時の取得に失敗しました: {}", e)))
        .map_err(RepositoryError::from)?
        .iter()
        .map(|r| column::<DateTime<Utc>>(r, "start_time"))
        .collect::<Result<_, _>>()?;

        let is_drop_in: bool = column(&row, "is_drop_in")?;
        let is_early_bird: bool = column(&row, "is_early_bird")?;
        let is_pay_what_you_want: bool = column(&row, "is_pay_what_you_want")?;
        let flags = [is_drop_in, is_early_bird, is_pay_what_you_want]
            .iter()
            .filter(|f| **f)
            .count();
        if flags > 1 {
            warn!(
                tour_id = %tour_id,
                is_drop_in,
                is_early_bird,
                is_pay_what_you_want,
                "複数の割引フラグが設定されています。優先順位に従って1つに解決します"
            );
        }

        let base_price: i64 = column(&row, "base_price")?;
        let currency =
            Currency::new(column(&row, "currency")?).map_err(|e| invalid_config(tour_id, e))?;
        let base_price = Money::new(base_price, currency).map_err(|e| invalid_config(tour_id, e))?;
        let group_size = GroupSize::new(column(&row, "min_group")?, column(&row, "max_group")?)
            .map_err(|e| invalid_config(tour_id, e))?;
        let deal_state = DealState::from_flags(
            is_drop_in,
            is_early_bird,
            is_pay_what_you_want,
            column::<Option<i64>>(&row, "early_bird_floor_price")?,
            base_price.amount(),
        );

        TourCapacityConfig::new(tour_id, group_size, base_price, deal_state, start_times)
            .map(Some)
            .map_err(|e| invalid_config(tour_id, e))
    }
}

/// インメモリツアーカタログ
/// テストやローカル実行用
#[derive(Default)]
pub struct InMemoryTourCatalog {
    configs: std::sync::RwLock<std::collections::HashMap<TourId, TourCapacityConfig>>,
}

impl InMemoryTourCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// ツアー設定を登録（既存の設定は置き換える）
    pub fn insert(&self, config: TourCapacityConfig) {
        let mut configs = self.configs.write().unwrap_or_else(|e| e.into_inner());
        configs.insert(config.tour_id(), config);
    }
}

#[async_trait]
impl TourCatalog for InMemoryTourCatalog {
    async fn find_config(
        &self,
        tour_id: TourId,
    ) -> Result<Option<TourCapacityConfig>, RepositoryError> {
        let configs = self.configs.read().unwrap_or_else(|e| e.into_inner());
        Ok(configs.get(&tour_id).cloned())
    }
}
