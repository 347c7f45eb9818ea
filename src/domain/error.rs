use crate::domain::model::BookingStatus;

/// ドメイン層のエラー型
/// ビジネスルール違反を表現する
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    /// 入力値の検証失敗（例: 人数が最小催行人数を下回る）
    /// クライアント側で修正が必要なため自動リトライしない
    #[error("Validation failed: {0}")]
    Validation(String),
    /// 定員超過（満席）
    /// 確定的な業務上の拒否であり、自動リトライしない
    #[error("Capacity exceeded: requested {requested}, remaining {remaining}")]
    CapacityExceeded { requested: u32, remaining: u32 },
    /// 許可されていない状態遷移（例: キャンセル済みの予約を再度キャンセル）
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// 通貨の不一致
    #[error("Currency mismatch")]
    CurrencyMismatch,
    /// 無効な値
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
