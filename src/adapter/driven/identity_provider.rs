use super::booking_ledger::column;
use crate::adapter::database_error::DatabaseError;
use crate::domain::model::TravelerId;
use crate::domain::port::{IdentityProvider, RepositoryError};
use async_trait::async_trait;
use sqlx::{MySql, Pool};
use std::collections::HashMap;

/// MySQL認証プロバイダー
/// 認証サービスが書き込むセッション表を読み、有効期限内のトークンだけを解決する
#[derive(Clone)]
pub struct MySqlIdentityProvider {
    pool: Pool<MySql>,
}

impl MySqlIdentityProvider {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for MySqlIdentityProvider {
    async fn resolve(&self, bearer_token: &str) -> Result<Option<TravelerId>, RepositoryError> {
        let row = sqlx::query(
            "SELECT traveler_id FROM traveler_sessions WHERE token = ? AND expires_at > UTC_TIMESTAMP(6)",
        )
        .bind(bearer_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("セッションの取得に失敗しました: {}", e)))
        .map_err(RepositoryError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        TravelerId::from_string(column(&row, "traveler_id")?)
            .map(Some)
            .map_err(|e| RepositoryError::FetchFailed(format!("旅行者IDの解析に失敗しました: {}", e)))
    }
}

/// 固定のトークン表による認証プロバイダー
/// テストやローカル実行用
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, TravelerId>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// トークンを登録する
    pub fn with_token(mut self, token: impl Into<String>, traveler_id: TravelerId) -> Self {
        self.tokens.insert(token.into(), traveler_id);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, bearer_token: &str) -> Result<Option<TravelerId>, RepositoryError> {
        Ok(self.tokens.get(bearer_token).copied())
    }
}
