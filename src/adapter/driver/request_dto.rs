use crate::application::service::BookingSearchParams;
use crate::domain::model::{BookingStatus, TourId, TravelerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ツアー予約用のリクエストDTO
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTourRequest {
    pub headcount: u32,
    pub selected_start_time: DateTime<Utc>,
    pub special_requests: Option<String>,
    /// 価格自由ツアーで旅行者が指定する1名あたりの価格
    pub headcount_price: Option<i64>,
}

/// ステータス更新用のリクエストDTO
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// 予約一覧取得用のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingsQueryParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub tour_id: Option<Uuid>,
    pub traveler_id: Option<Uuid>,
    pub status: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_headcount: Option<u32>,
    pub max_headcount: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl BookingsQueryParams {
    /// アプリケーション層の検索パラメータに変換する
    /// 範囲やページングの検証はクエリサービス側で行う
    pub fn into_search_params(self) -> Result<BookingSearchParams, String> {
        let status = self
            .status
            .as_deref()
            .map(BookingStatus::from_string)
            .transpose()
            .map_err(|e| e.to_string())?;

        Ok(BookingSearchParams {
            page: self.page,
            limit: self.limit,
            tour_id: self.tour_id.map(TourId::from_uuid),
            traveler_id: self.traveler_id.map(TravelerId::from_uuid),
            status,
            min_price: self.min_price,
            max_price: self.max_price,
            min_headcount: self.min_headcount,
            max_headcount: self.max_headcount,
            start_date: self.start_date,
            end_date: self.end_date,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
        })
    }
}
