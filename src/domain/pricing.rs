// 価格計算
// 定員設定と確保済み人数から現在価格を求める純粋関数群
// I/Oもロックも持たないため、どこからでも呼び出せる

use crate::domain::model::{DealState, Money, TourCapacityConfig};

/// 見積もり結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    /// 計算された1名あたりの価格
    Fixed(Money),
    /// 価格自由ツアー（旅行者が価格を指定する）
    TravelerSpecified,
}

impl Quote {
    /// 計算済みの価格（価格自由の場合は None）
    pub fn price(&self) -> Option<Money> {
        match self {
            Quote::Fixed(price) => Some(*price),
            Quote::TravelerSpecified => None,
        }
    }
}

/// 価格計算エンジン
pub struct PricingEngine;

impl PricingEngine {
    /// 現在の1名あたり価格を見積もる
    ///
    /// # Arguments
    /// * `config` - ツアーの定員・価格設定
    /// * `confirmed_headcount` - 確保済み人数（定員を超える値は定員として扱う）
    ///
    /// 早割の場合、確保済み人数0で基本価格、定員到達で下限価格となり、
    /// その間は線形に変化する。割引額は切り捨てる。
    pub fn quote(config: &TourCapacityConfig, confirmed_headcount: u32) -> Quote {
        let base = config.base_price();
        match config.deal_state() {
            DealState::None | DealState::DropIn => Quote::Fixed(base),
            DealState::PayWhatYouWant => Quote::TravelerSpecified,
            DealState::EarlyBird { floor_price } => {
                let max_group = i128::from(config.max_group());
                let filled = i128::from(confirmed_headcount.min(config.max_group()));
                let spread = i128::from(base.amount()) - i128::from(floor_price);
                // 割引額は 0〜spread に収まるため i64 に戻せる
                let discount = (spread * filled / max_group) as i64;
                // 下限価格は基本価格以下に検証済みのため負にならない
                match Money::new(base.amount() - discount, base.currency()) {
                    Ok(price) => Quote::Fixed(price),
                    Err(_) => Quote::Fixed(base),
                }
            }
        }
    }
}

/// 表示用の充足率（0〜100、四捨五入）
pub fn progress_percentage(confirmed_headcount: u32, max_group: u32) -> u8 {
    if max_group == 0 {
        return 0;
    }
    let filled = u64::from(confirmed_headcount.min(max_group));
    let max = u64::from(max_group);
    let rounded = (filled * 200 + max) / (2 * max);
    rounded.min(100) as u8
}
