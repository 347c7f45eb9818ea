use crate::domain::error::DomainError;
use crate::domain::model::{Currency, Money, TourId, MAX_HEADCOUNT, MAX_UNIT_PRICE};
use chrono::{DateTime, Utc};

/// 割引・価格設定の種別
/// 旧データの独立したフラグ群ではなく、排他的な列挙として表現する
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealState {
    /// 特になし（基本価格で固定）
    None,
    /// 直前参加（割引なし、基本価格で固定）
    DropIn,
    /// 早割（グループが埋まるほど下限価格へ近づく）
    EarlyBird { floor_price: i64 },
    /// 価格自由（旅行者が価格を指定する）
    PayWhatYouWant,
}

impl DealState {
    /// 永続化用の文字列表現
    pub fn kind(&self) -> &'static str {
        match self {
            DealState::None => "none",
            DealState::DropIn => "drop_in",
            DealState::EarlyBird { .. } => "early_bird",
            DealState::PayWhatYouWant => "pay_what_you_want",
        }
    }

    /// 旧カタログの独立フラグから変換する
    /// 複数立っている場合は pay_what_you_want > early_bird > drop_in の順で優先する
    pub fn from_flags(
        is_drop_in: bool,
        is_early_bird: bool,
        is_pay_what_you_want: bool,
        early_bird_floor: Option<i64>,
        base_price: i64,
    ) -> Self {
        if is_pay_what_you_want {
            DealState::PayWhatYouWant
        } else if is_early_bird {
            DealState::EarlyBird {
                floor_price: early_bird_floor
                    .unwrap_or_else(|| (i128::from(base_price) * 7 / 10) as i64),
            }
        } else if is_drop_in {
            DealState::DropIn
        } else {
            DealState::None
        }
    }
}

/// グループ人数の制約（最小催行人数と定員）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSize {
    min: u32,
    max: u32,
}

impl GroupSize {
    /// 1 ≤ min ≤ max ≤ 20 を満たす場合のみ作成できる
    pub fn new(min: u32, max: u32) -> Result<Self, DomainError> {
        if min == 0 || min > max || max > MAX_HEADCOUNT {
            return Err(DomainError::InvalidValue(format!(
                "グループ人数の設定が不正です: min={}, max={}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

/// ツアーの定員・価格設定
/// カタログが所有し、このサービスからは読み取り専用
#[derive(Debug, Clone, PartialEq)]
pub struct TourCapacityConfig {
    tour_id: TourId,
    group_size: GroupSize,
    base_price: Money,
    deal_state: DealState,
    start_times: Vec<DateTime<Utc>>,
}

impl TourCapacityConfig {
    /// 新しい定員設定を作成
    /// 開始日時は昇順に並べ替え、重複を除く
    pub fn new(
        tour_id: TourId,
        group_size: GroupSize,
        base_price: Money,
        deal_state: DealState,
        mut start_times: Vec<DateTime<Utc>>,
    ) -> Result<Self, DomainError> {
        if base_price.amount() > MAX_UNIT_PRICE {
            return Err(DomainError::InvalidValue(format!(
                "基本価格が上限({})を超えています: {}",
                MAX_UNIT_PRICE,
                base_price.amount()
            )));
        }
        if let DealState::EarlyBird { floor_price } = deal_state {
            if floor_price < 0 || floor_price > base_price.amount() {
                return Err(DomainError::InvalidValue(format!(
                    "早割の下限価格は0以上かつ基本価格以下である必要があります: {}",
                    floor_price
                )));
            }
        }
        start_times.sort();
        start_times.dedup();

        Ok(Self {
            tour_id,
            group_size,
            base_price,
            deal_state,
            start_times,
        })
    }

    pub fn tour_id(&self) -> TourId {
        self.tour_id
    }

    pub fn min_group(&self) -> u32 {
        self.group_size.min()
    }

    pub fn max_group(&self) -> u32 {
        self.group_size.max()
    }

    pub fn base_price(&self) -> Money {
        self.base_price
    }

    pub fn currency(&self) -> Currency {
        self.base_price.currency()
    }

    pub fn deal_state(&self) -> DealState {
        self.deal_state
    }

    pub fn start_times(&self) -> &[DateTime<Utc>] {
        &self.start_times
    }

    /// 人数が最小催行人数〜定員の範囲内か検証する
    pub fn validate_headcount(&self, headcount: u32) -> Result<(), DomainError> {
        if headcount < self.min_group() || headcount > self.max_group() {
            return Err(DomainError::Validation(format!(
                "人数は{}〜{}名の範囲で指定してください: {}",
                self.min_group(),
                self.max_group(),
                headcount
            )));
        }
        Ok(())
    }

    /// 選択された開始日時がツアーの開始日時に含まれ、かつ未来であるか検証する
    pub fn validate_start_time(
        &self,
        selected: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.start_times.binary_search(&selected).is_err() {
            return Err(DomainError::Validation(format!(
                "指定された開始日時はこのツアーに存在しません: {}",
                selected.to_rfc3339()
            )));
        }
        if selected <= now {
            return Err(DomainError::Validation(format!(
                "開始日時を過ぎたツアーは予約できません: {}",
                selected.to_rfc3339()
            )));
        }
        Ok(())
    }
}
