use crate::domain::error::DomainError;
use crate::domain::model::{BookingId, TourId};
use crate::domain::pricing;

/// ツアーごとの座席カウンター集約
/// 確保済み人数を保持し、空席数や充足率は読み出し時に導出する
#[derive(Debug, Clone, PartialEq)]
pub struct TourCapacityCounter {
    tour_id: TourId,
    max_group: u32,
    confirmed_headcount: u32,
}

impl TourCapacityCounter {
    /// 新しいカウンターを作成
    ///
    /// # Arguments
    /// * `tour_id` - ツアーID
    /// * `max_group` - 定員
    /// * `confirmed_headcount` - 確保済み人数
    pub fn new(tour_id: TourId, max_group: u32, confirmed_headcount: u32) -> Self {
        Self {
            tour_id,
            max_group,
            confirmed_headcount,
        }
    }

    /// ツアーIDを取得
    pub fn tour_id(&self) -> TourId {
        self.tour_id
    }

    /// 定員を取得
    pub fn max_group(&self) -> u32 {
        self.max_group
    }

    /// 確保済み人数を取得
    pub fn confirmed_headcount(&self) -> u32 {
        self.confirmed_headcount
    }

    /// 残り座席数
    pub fn spots_left(&self) -> u32 {
        self.max_group.saturating_sub(self.confirmed_headcount)
    }

    /// 満席かどうか
    pub fn is_fully_booked(&self) -> bool {
        self.spots_left() == 0
    }

    /// 表示用の充足率（0〜100）
    pub fn progress_percentage(&self) -> u8 {
        pricing::progress_percentage(self.confirmed_headcount, self.max_group)
    }

    /// 指定された人数分の座席が空いているかチェック
    pub fn has_room_for(&self, headcount: u32) -> bool {
        self.confirmed_headcount + headcount <= self.max_group
    }

    /// 座席を確保する
    /// 空きが足りない場合は状態を変更せずにエラーを返す
    ///
    /// # Returns
    /// * `Ok(())` - 確保成功
    /// * `Err(DomainError::CapacityExceeded)` - 満席
    pub fn reserve(&mut self, headcount: u32) -> Result<(), DomainError> {
        if !self.has_room_for(headcount) {
            return Err(DomainError::CapacityExceeded {
                requested: headcount,
                remaining: self.spots_left(),
            });
        }
        self.confirmed_headcount += headcount;
        Ok(())
    }

    /// 座席を解放する（キャンセル時など）
    /// 0未満にはならない
    pub fn release(&mut self, headcount: u32) {
        self.confirmed_headcount = self.confirmed_headcount.saturating_sub(headcount);
    }
}

/// 座席の仮押さえ
/// 特定の予約IDに紐づいた確保結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub booking_id: BookingId,
    pub tour_id: TourId,
    pub headcount: u32,
    /// 確保後のカウンター値
    pub confirmed_headcount_after: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_creation() {
        let tour_id = TourId::new();
        let counter = TourCapacityCounter::new(tour_id, 10, 0);
        assert_eq!(counter.tour_id(), tour_id);
        assert_eq!(counter.spots_left(), 10);
        assert_eq!(counter.progress_percentage(), 0);
        assert!(!counter.is_fully_booked());
    }

    #[test]
    fn test_reserve_success() {
        let mut counter = TourCapacityCounter::new(TourId::new(), 10, 0);
        assert!(counter.reserve(4).is_ok());
        assert_eq!(counter.confirmed_headcount(), 4);
        assert_eq!(counter.spots_left(), 6);
        assert_eq!(counter.progress_percentage(), 40);
    }

    #[test]
    fn test_reserve_exact_remaining_capacity() {
        let mut counter = TourCapacityCounter::new(TourId::new(), 4, 1);
        assert!(counter.reserve(3).is_ok());
        assert!(counter.is_fully_booked());
        assert_eq!(counter.progress_percentage(), 100);
    }

    #[test]
    fn test_reserve_capacity_exceeded_leaves_counter_unchanged() {
        let mut counter = TourCapacityCounter::new(TourId::new(), 4, 3);
        let result = counter.reserve(2);
        assert_eq!(
            result,
            Err(DomainError::CapacityExceeded {
                requested: 2,
                remaining: 1
            })
        );
        assert_eq!(counter.confirmed_headcount(), 3); // カウンターは変わらない
    }

    #[test]
    fn test_release_never_goes_negative() {
        let mut counter = TourCapacityCounter::new(TourId::new(), 4, 2);
        counter.release(3);
        assert_eq!(counter.confirmed_headcount(), 0);
    }
}
