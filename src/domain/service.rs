// ドメインサービス
// 複数の集約にまたがるビジネスロジックを実装

use crate::domain::error::DomainError;
use crate::domain::model::{Booking, BookingId, Reservation, TourCapacityConfig};
use crate::domain::port::{BookingLedger, RepositoryError, ReserveOutcome};
use std::sync::Arc;
use tracing::{debug, info};

/// 座席確保の失敗
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReserveError {
    /// 業務上の拒否（満席など）
    #[error(transparent)]
    Rejected(#[from] DomainError),
    /// 台帳への書き込み失敗
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

/// 座席ガード
/// 予約作成時の座席確保、キャンセル時の座席解放を担当
///
/// 判定と加算は台帳側の1つの条件付き更新で行い、ここで読み取ってから書き込むことはしない
pub struct CapacityGuard {
    ledger: Arc<dyn BookingLedger>,
}

impl CapacityGuard {
    /// 新しい座席ガードを作成
    ///
    /// # Arguments
    /// * `ledger` - 予約台帳
    pub fn new(ledger: Arc<dyn BookingLedger>) -> Self {
        Self { ledger }
    }

    /// 予約の人数分の座席を確保し、予約を仮押さえとして保存する
    ///
    /// # Returns
    /// * `Ok(Reservation)` - 確保成功
    /// * `Err(ReserveError::Rejected)` - 満席または人数不正（再試行しない）
    /// * `Err(ReserveError::Store)` - 保存失敗
    pub async fn reserve(
        &self,
        booking: &Booking,
        config: &TourCapacityConfig,
    ) -> Result<Reservation, ReserveError> {
        let headcount = booking.headcount();
        if headcount == 0 || headcount > config.max_group() {
            return Err(DomainError::Validation(format!(
                "人数は1〜{}名の範囲で指定してください: {}",
                config.max_group(),
                headcount
            ))
            .into());
        }

        match self
            .ledger
            .reserve_and_append(booking, config.max_group())
            .await?
        {
            ReserveOutcome::Reserved(reservation) => {
                info!(
                    booking_id = %reservation.booking_id,
                    tour_id = %reservation.tour_id,
                    headcount = reservation.headcount,
                    confirmed_headcount = reservation.confirmed_headcount_after,
                    max_group = config.max_group(),
                    "座席を確保しました"
                );
                Ok(reservation)
            }
            ReserveOutcome::Rejected { remaining } => {
                info!(
                    booking_id = %booking.id(),
                    tour_id = %booking.tour_id(),
                    headcount,
                    remaining,
                    "満席のため座席を確保できませんでした"
                );
                Err(DomainError::CapacityExceeded {
                    requested: headcount,
                    remaining,
                }
                .into())
            }
        }
    }

    /// 予約が保持している座席を解放する
    /// 同じ予約に対して繰り返し呼ばれても解放は一度だけ
    ///
    /// # Returns
    /// * `Ok(true)` - 今回の呼び出しで解放した
    /// * `Ok(false)` - 既に解放済み
    pub async fn release(&self, booking_id: BookingId) -> Result<bool, RepositoryError> {
        let released = self.ledger.release(booking_id).await?;
        if released {
            info!(booking_id = %booking_id, "座席を解放しました");
        } else {
            debug!(booking_id = %booking_id, "座席は既に解放済みです");
        }
        Ok(released)
    }
}
