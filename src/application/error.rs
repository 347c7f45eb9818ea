use crate::domain::error::DomainError;
use crate::domain::port::RepositoryError;
use crate::domain::service::ReserveError;

/// アプリケーション層のエラー型
/// ドメインエラー、リポジトリエラーをラップする
#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    /// ドメインエラー（ビジネスルール違反）
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),
    /// リポジトリエラー（永続化の失敗、再試行可能）
    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),
    /// エンティティが見つからない
    #[error("Not found: {0}")]
    NotFound(String),
    /// 認証されていない
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// 認証済みだが操作の権限がない
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

// 座席確保の失敗は中身に応じて振り分ける
impl From<ReserveError> for ApplicationError {
    fn from(err: ReserveError) -> Self {
        match err {
            ReserveError::Rejected(e) => ApplicationError::DomainError(e),
            ReserveError::Store(e) => ApplicationError::RepositoryError(e),
        }
    }
}
