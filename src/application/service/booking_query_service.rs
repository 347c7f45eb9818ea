use crate::application::ApplicationError;
use crate::domain::error::DomainError;
use crate::domain::model::{Booking, BookingId, BookingStatus, TourId, TravelerId};
use crate::domain::port::{BookingCriteria, BookingLedger, BookingSortField, SortOrder};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// 予約検索パラメータ（未検証）
#[derive(Debug, Clone, Default)]
pub struct BookingSearchParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub tour_id: Option<TourId>,
    pub traveler_id: Option<TravelerId>,
    pub status: Option<BookingStatus>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_headcount: Option<u32>,
    pub max_headcount: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// 1ページ分の検索結果
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl BookingSearchParams {
    /// パラメータを検証して台帳の検索条件に変換する
    ///
    /// # Returns
    /// * `Ok((BookingCriteria, page))` - 検索条件とページ番号
    /// * `Err(DomainError::Validation)` - 範囲外の値、逆転した範囲、未知の並び替え項目
    pub fn into_criteria(self) -> Result<(BookingCriteria, u32), DomainError> {
        let page = self.page.unwrap_or(DEFAULT_PAGE);
        if page < 1 || page > u32::MAX as i64 {
            return Err(DomainError::Validation(format!(
                "page は1以上で指定してください: {}",
                page
            )));
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(DomainError::Validation(format!(
                "limit は1〜{}の範囲で指定してください: {}",
                MAX_LIMIT, limit
            )));
        }

        ensure_ordered("minPrice", "maxPrice", self.min_price, self.max_price)?;
        ensure_ordered(
            "minHeadcount",
            "maxHeadcount",
            self.min_headcount,
            self.max_headcount,
        )?;
        ensure_ordered("startDate", "endDate", self.start_date, self.end_date)?;

        let sort_by = match self.sort_by.as_deref() {
            None => BookingSortField::default(),
            Some(s) => BookingSortField::from_string(s).ok_or_else(|| {
                DomainError::Validation(format!("未知の並び替え項目です: {}", s))
            })?,
        };
        let sort_order = match self.sort_order.as_deref() {
            None => SortOrder::default(),
            Some(s) => SortOrder::from_string(s)
                .ok_or_else(|| DomainError::Validation(format!("未知の並び順です: {}", s)))?,
        };

        let page = page as u32;
        let limit = limit as u32;
        let criteria = BookingCriteria {
            tour_id: self.tour_id,
            traveler_id: self.traveler_id,
            status: self.status,
            min_price: self.min_price,
            max_price: self.max_price,
            min_headcount: self.min_headcount,
            max_headcount: self.max_headcount,
            start_date: self.start_date,
            end_date: self.end_date,
            sort_by,
            sort_order,
            offset: (page as u64 - 1) * limit as u64,
            limit,
        };
        Ok((criteria, page))
    }
}

fn ensure_ordered<T: PartialOrd + std::fmt::Debug>(
    min_name: &str,
    max_name: &str,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), DomainError> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(DomainError::Validation(format!(
            "{} が {} を超えています: {:?} > {:?}",
            min_name, max_name, min, max
        ))),
        _ => Ok(()),
    }
}

/// 予約クエリサービス
/// 読み取り専用の予約操作を提供する
pub struct BookingQueryService {
    ledger: Arc<dyn BookingLedger>,
}

impl BookingQueryService {
    /// 新しい予約クエリサービスを作成
    ///
    /// # Arguments
    /// * `ledger` - 予約台帳
    pub fn new(ledger: Arc<dyn BookingLedger>) -> Self {
        Self { ledger }
    }

    /// 予約IDで予約を取得
    ///
    /// # Returns
    /// * `Ok(Some(Booking))` - 予約が見つかった
    /// * `Ok(None)` - 予約が見つからなかった
    /// * `Err(ApplicationError)` - 取得失敗
    pub async fn get_booking_by_id(&self, id: BookingId) -> Result<Option<Booking>, ApplicationError> {
        self.ledger.get(id).await.map_err(ApplicationError::from)
    }

    /// ツアーの全予約を作成日時の昇順で取得
    pub async fn get_bookings_by_tour(&self, tour_id: TourId) -> Result<Vec<Booking>, ApplicationError> {
        self.ledger
            .list_by_tour(tour_id)
            .await
            .map_err(ApplicationError::from)
    }

    /// 条件に一致する予約を検索し、1ページ分を返す
    pub async fn search_bookings(
        &self,
        params: BookingSearchParams,
    ) -> Result<Page<Booking>, ApplicationError> {
        let (criteria, page) = params.into_criteria()?;
        let (data, total) = self.ledger.query(&criteria).await?;
        let limit = criteria.limit;
        let total_pages = total.div_ceil(limit as u64);

        debug!(
            page,
            limit,
            total,
            returned = data.len(),
            sort_by = criteria.sort_by.column(),
            sort_order = criteria.sort_order.as_sql(),
            "予約を検索しました"
        );

        Ok(Page {
            data,
            page,
            limit,
            total,
            total_pages,
        })
    }
}
