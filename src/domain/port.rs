// 出力ポート
// ドメイン層が外部に依存する機能をトレイトとして定義
// アダプター層でこれらのトレイトを実装する

use crate::domain::event::DomainEvent;
use crate::domain::model::{
    Booking, BookingId, BookingStatus, Reservation, TourCapacityConfig, TourCapacityCounter,
    TourId, TravelerId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// リポジトリエラー型
/// リポジトリ操作で発生するエラーを表現する
///
/// いずれもトランザクション単位でロールバックされるため、部分的な状態は残らない
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum RepositoryError {
    /// データベース接続に失敗
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// 操作に失敗
    #[error("Operation failed: {0}")]
    OperationFailed(String),
    /// データの取得に失敗
    #[error("Fetch failed: {0}")]
    FetchFailed(String),
}

impl RepositoryError {
    /// バックオフ付きで再試行してよいエラーか
    /// 取得データの破損は再試行しても解消しない
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RepositoryError::FetchFailed(_))
    }
}

/// 時刻の取得を抽象化するポート
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// ツアーカタログ（外部コンテキスト）
/// 定員・価格設定を読み取り専用で提供する
#[async_trait]
pub trait TourCatalog: Send + Sync {
    /// ツアーIDで定員設定を取得する
    ///
    /// # Returns
    /// * `Ok(Some(TourCapacityConfig))` - ツアーが見つかった
    /// * `Ok(None)` - ツアーが見つからなかった
    /// * `Err(RepositoryError)` - 取得失敗
    async fn find_config(
        &self,
        tour_id: TourId,
    ) -> Result<Option<TourCapacityConfig>, RepositoryError>;
}

/// 認証サービス（外部コンテキスト）
/// Bearerトークンを利用者IDに解決する。トークンの発行・検証ロジックはこのサービスに持たない
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// # Returns
    /// * `Ok(Some(TravelerId))` - 有効なトークン
    /// * `Ok(None)` - 無効または期限切れのトークン
    async fn resolve(&self, bearer_token: &str) -> Result<Option<TravelerId>, RepositoryError>;
}

/// イベント発行エラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PublisherError {
    #[error("Event publishing failed: {0}")]
    PublishingFailed(String),
}

/// イベント発行者トレイト
/// 台帳への書き込み確定後に呼び出される
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &DomainEvent) -> Result<(), PublisherError>;
}

/// 座席確保の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// 確保し、予約を保存した
    Reserved(Reservation),
    /// 空きが足りず、何も書き込まなかった
    Rejected { remaining: u32 },
}

/// 状態遷移の書き込み結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// 書き込んだ（released はこの書き込みで座席を解放したか）
    Applied { released: bool },
    /// 期待したステータスではなかった（並行する遷移に先を越された）
    Stale { current: Option<BookingStatus> },
}

/// 予約の並び替え項目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookingSortField {
    #[default]
    CreatedAt,
    SelectedStartTime,
    PriceAtBooking,
    Headcount,
    Status,
}

impl BookingSortField {
    /// クエリ文字列から変換する
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "createdAt" => Some(BookingSortField::CreatedAt),
            "selectedStartTime" => Some(BookingSortField::SelectedStartTime),
            "priceAtBooking" => Some(BookingSortField::PriceAtBooking),
            "headcount" => Some(BookingSortField::Headcount),
            "status" => Some(BookingSortField::Status),
            _ => None,
        }
    }

    /// 対応するカラム名
    pub fn column(&self) -> &'static str {
        match self {
            BookingSortField::CreatedAt => "created_at",
            BookingSortField::SelectedStartTime => "selected_start_time",
            BookingSortField::PriceAtBooking => "price_at_booking",
            BookingSortField::Headcount => "headcount",
            BookingSortField::Status => "status",
        }
    }
}

/// 並び順
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// 予約検索条件
/// 範囲指定はいずれも両端を含む
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingCriteria {
    pub tour_id: Option<TourId>,
    pub traveler_id: Option<TravelerId>,
    pub status: Option<BookingStatus>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_headcount: Option<u32>,
    pub max_headcount: Option<u32>,
    /// 開始日時の下限
    pub start_date: Option<DateTime<Utc>>,
    /// 開始日時の上限
    pub end_date: Option<DateTime<Utc>>,
    pub sort_by: BookingSortField,
    pub sort_order: SortOrder,
    pub offset: u64,
    pub limit: u32,
}

impl BookingCriteria {
    /// 予約が条件に一致するか
    /// 価格条件がある場合、価格未確定の予約は一致しない
    pub fn matches(&self, booking: &Booking) -> bool {
        let price = booking.price_at_booking().map(|p| p.amount());
        let price_ok = match (self.min_price, self.max_price) {
            (None, None) => true,
            (min, max) => price.is_some_and(|p| {
                min.map_or(true, |m| p >= m) && max.map_or(true, |m| p <= m)
            }),
        };

        self.tour_id.map_or(true, |id| booking.tour_id() == id)
            && self.traveler_id.map_or(true, |id| booking.traveler_id() == id)
            && self.status.map_or(true, |s| booking.status() == s)
            && price_ok
            && self.min_headcount.map_or(true, |h| booking.headcount() >= h)
            && self.max_headcount.map_or(true, |h| booking.headcount() <= h)
            && self
                .start_date
                .map_or(true, |d| booking.selected_start_time() >= d)
            && self
                .end_date
                .map_or(true, |d| booking.selected_start_time() <= d)
    }

    /// 並び替え条件に従って2件の予約を比較する
    /// 価格未確定は昇順で先頭になる（MySQLの NULL の扱いと同じ）。同値の場合は予約IDで順序を固定する
    pub fn compare(&self, a: &Booking, b: &Booking) -> Ordering {
        let ordering = match self.sort_by {
            BookingSortField::CreatedAt => a.created_at().cmp(&b.created_at()),
            BookingSortField::SelectedStartTime => {
                a.selected_start_time().cmp(&b.selected_start_time())
            }
            BookingSortField::PriceAtBooking => a
                .price_at_booking()
                .map(|p| p.amount())
                .cmp(&b.price_at_booking().map(|p| p.amount())),
            BookingSortField::Headcount => a.headcount().cmp(&b.headcount()),
            BookingSortField::Status => a.status().as_str().cmp(b.status().as_str()),
        };
        let ordering = match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };
        ordering.then_with(|| a.id().to_string().cmp(&b.id().to_string()))
    }
}

/// 予約台帳トレイト
/// 予約レコードとツアーごとの座席カウンターを同じトランザクション境界で永続化する
#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// 座席を確保し、同じトランザクションで予約を保存する
    ///
    /// 確保済み人数 + 人数 <= 定員 の判定と加算は1つの条件付き更新で行う
    ///
    /// # Arguments
    /// * `booking` - 保存する仮押さえ状態の予約
    /// * `max_group` - ツアーの定員
    ///
    /// # Returns
    /// * `Ok(ReserveOutcome::Reserved)` - 確保・保存成功
    /// * `Ok(ReserveOutcome::Rejected)` - 満席（何も書き込まない）
    /// * `Err(RepositoryError)` - 保存失敗
    async fn reserve_and_append(
        &self,
        booking: &Booking,
        max_group: u32,
    ) -> Result<ReserveOutcome, RepositoryError>;

    /// 状態遷移後の予約を書き込む
    ///
    /// 保存中のステータスが `expected` と一致する場合のみ書き込む。
    /// 遷移先がキャンセルの場合は同じトランザクションで座席を解放する
    async fn apply_transition(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<TransitionOutcome, RepositoryError>;

    /// 予約が保持している座席を解放する
    /// 同じ予約IDに対して何度呼ばれても、カウンターが減るのは一度だけ
    ///
    /// # Returns
    /// * `Ok(true)` - 今回の呼び出しで解放した
    /// * `Ok(false)` - 既に解放済み、または予約が存在しない
    async fn release(&self, booking_id: BookingId) -> Result<bool, RepositoryError>;

    /// 予約IDで予約を取得する
    async fn get(&self, booking_id: BookingId) -> Result<Option<Booking>, RepositoryError>;

    /// ツアーの全予約を作成日時の昇順で取得する
    async fn list_by_tour(&self, tour_id: TourId) -> Result<Vec<Booking>, RepositoryError>;

    /// ツアーの座席カウンターを取得する
    /// 予約がまだ無いツアーは確保済み人数0として返す
    async fn counter_for(
        &self,
        tour_id: TourId,
        max_group: u32,
    ) -> Result<TourCapacityCounter, RepositoryError>;

    /// 作成日時が `cutoff` 以前の仮押さえ予約を古い順に取得する
    async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Booking>, RepositoryError>;

    /// 条件に一致する予約の1ページ分と総件数を取得する
    async fn query(
        &self,
        criteria: &BookingCriteria,
    ) -> Result<(Vec<Booking>, u64), RepositoryError>;

    /// 新しい一意の予約IDを生成する
    fn next_identity(&self) -> BookingId;
}
