use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{
    Booking, BookingId, BookingSnapshot, BookingStatus, Currency, Reservation,
    TourCapacityCounter, TourId, TravelerId,
};
use crate::domain::port::{
    BookingCriteria, BookingLedger, RepositoryError, ReserveOutcome, TransitionOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, Pool, QueryBuilder, Row, Transaction};
use tracing::{error, warn};

const BOOKING_COLUMNS: &str = "id, tour_id, traveler_id, headcount, currency, offered_price, \
     special_requests, price_at_booking, status, selected_start_time, created_at, \
     confirmed_at, cancelled_at, completed_at";

/// MySQL予約台帳
/// 予約テーブルと座席カウンターテーブルを同じトランザクションで更新する
#[derive(Clone)]
pub struct MySqlBookingLedger {
    pool: Pool<MySql>,
}

impl MySqlBookingLedger {
    /// 新しいMySQL予約台帳を作成
    ///
    /// # Arguments
    /// * `pool` - MySQLコネクションプール
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, MySql>, RepositoryError> {
        self.pool
            .begin()
            .await
            .map_err(|e| {
                DatabaseError::ConnectionError(format!("トランザクション開始に失敗しました: {}", e))
            })
            .map_err(RepositoryError::from)
    }
}

fn query_error(context: &str, e: sqlx::Error) -> RepositoryError {
    DatabaseError::QueryError(format!("{}に失敗しました: {}", context, e)).into()
}

async fn commit(tx: Transaction<'static, MySql>) -> Result<(), RepositoryError> {
    tx.commit()
        .await
        .map_err(|e| query_error("コミット", e))
}

fn parse_failed(what: &str, e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::FetchFailed(format!("{}の解析に失敗しました: {}", what, e))
}

fn decode_failed(name: &str, e: sqlx::Error) -> RepositoryError {
    error!(column = name, error = %e, "カラムの読み出しに失敗しました");
    parse_failed(name, e)
}

/// カラムを読み出す。存在しない・型が合わない場合は FetchFailed
pub(crate) fn column<'r, T>(row: &'r MySqlRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get(name).map_err(|e| decode_failed(name, e))
}

/// データベースの行から予約を再構築する
fn booking_from_row(row: &MySqlRow) -> Result<Booking, RepositoryError> {
    let id = BookingId::from_string(column(row, "id")?).map_err(|e| parse_failed("予約ID", e))?;
    let tour_id =
        TourId::from_string(column(row, "tour_id")?).map_err(|e| parse_failed("ツアーID", e))?;
    let traveler_id = TravelerId::from_string(column(row, "traveler_id")?)
        .map_err(|e| parse_failed("旅行者ID", e))?;
    let currency = Currency::new(column(row, "currency")?).map_err(|e| parse_failed("通貨", e))?;
    let status = BookingStatus::from_string(column(row, "status")?)
        .map_err(|e| parse_failed("予約ステータス", e))?;

    let snapshot = BookingSnapshot {
        id,
        tour_id,
        traveler_id,
        headcount: column::<u32>(row, "headcount")?,
        currency,
        offered_price: column::<Option<i64>>(row, "offered_price")?,
        special_requests: column::<Option<String>>(row, "special_requests")?,
        price_at_booking: column::<Option<i64>>(row, "price_at_booking")?,
        status,
        selected_start_time: column::<DateTime<Utc>>(row, "selected_start_time")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
        confirmed_at: column::<Option<DateTime<Utc>>>(row, "confirmed_at")?,
        cancelled_at: column::<Option<DateTime<Utc>>>(row, "cancelled_at")?,
        completed_at: column::<Option<DateTime<Utc>>>(row, "completed_at")?,
    };

    Booking::reconstruct(snapshot).map_err(|e| {
        error!(booking_id = %id, error = %e, "予約データが不正です");
        RepositoryError::FetchFailed(format!("予約集約の再構築に失敗しました: {}", e))
    })
}

fn bookings_from_rows(rows: Vec<MySqlRow>) -> Result<Vec<Booking>, RepositoryError> {
    rows.iter().map(booking_from_row).collect()
}

/// 座席を一度だけ解放する
/// capacity_released フラグの条件付き更新に成功した場合のみカウンターを減らす
async fn release_in_tx(
    tx: &mut Transaction<'static, MySql>,
    booking_id: BookingId,
    tour_id: TourId,
    headcount: u32,
) -> Result<bool, RepositoryError> {
    let flagged = sqlx::query(
        "UPDATE bookings SET capacity_released = TRUE WHERE id = ? AND capacity_released = FALSE",
    )
    .bind(booking_id.to_string())
    .execute(&mut **tx)
    .await
    .map_err(|e| query_error("解放フラグの更新", e))?;

    if flagged.rows_affected() == 0 {
        return Ok(false);
    }

    let decremented = sqlx::query(
        r#"
        UPDATE tour_capacity_counters
        SET confirmed_headcount = confirmed_headcount - ?
        WHERE tour_id = ? AND confirmed_headcount >= ?
        "#,
    )
    .bind(headcount)
    .bind(tour_id.to_string())
    .bind(headcount)
    .execute(&mut **tx)
    .await
    .map_err(|e| query_error("座席カウンターの減算", e))?;

    if decremented.rows_affected() == 0 {
        warn!(
            booking_id = %booking_id,
            tour_id = %tour_id,
            headcount,
            "座席カウンターが解放人数より少ないため減算しませんでした"
        );
    }
    Ok(true)
}

/// 検索条件をWHERE句として追加する
fn push_filters(builder: &mut QueryBuilder<'_, MySql>, criteria: &BookingCriteria) {
    builder.push(" WHERE 1 = 1");
    if let Some(tour_id) = criteria.tour_id {
        builder.push(" AND tour_id = ").push_bind(tour_id.to_string());
    }
    if let Some(traveler_id) = criteria.traveler_id {
        builder
            .push(" AND traveler_id = ")
            .push_bind(traveler_id.to_string());
    }
    if let Some(status) = criteria.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(min) = criteria.min_price {
        builder.push(" AND price_at_booking >= ").push_bind(min);
    }
    if let Some(max) = criteria.max_price {
        builder.push(" AND price_at_booking <= ").push_bind(max);
    }
    if let Some(min) = criteria.min_headcount {
        builder.push(" AND headcount >= ").push_bind(min);
    }
    if let Some(max) = criteria.max_headcount {
        builder.push(" AND headcount <= ").push_bind(max);
    }
    if let Some(start) = criteria.start_date {
        builder.push(" AND selected_start_time >= ").push_bind(start);
    }
    if let Some(end) = criteria.end_date {
        builder.push(" AND selected_start_time <= ").push_bind(end);
    }
}

#[async_trait]
impl BookingLedger for MySqlBookingLedger {
    async fn reserve_and_append(
        &self,
        booking: &Booking,
        max_group: u32,
    ) -> Result<ReserveOutcome, RepositoryError> {
        let mut tx = self.begin().await?;
        let tour_id = booking.tour_id().to_string();
        let headcount = booking.headcount();

        // ツアーごとのカウンター行を用意する
        sqlx::query(
            "INSERT IGNORE INTO tour_capacity_counters (tour_id, confirmed_headcount) VALUES (?, 0)",
        )
        .bind(&tour_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| query_error("座席カウンターの作成", e))?;

        // 判定と加算を1文で行う
        let updated = sqlx::query(
            r#"
            UPDATE tour_capacity_counters
            SET confirmed_headcount = confirmed_headcount + ?
            WHERE tour_id = ? AND confirmed_headcount + ? <= ?
            "#,
        )
        .bind(headcount)
        .bind(&tour_id)
        .bind(headcount)
        .bind(max_group)
        .execute(&mut *tx)
        .await
        .map_err(|e| query_error("座席カウンターの加算", e))?;

        if updated.rows_affected() == 0 {
            let current: u32 = sqlx::query(
                "SELECT confirmed_headcount FROM tour_capacity_counters WHERE tour_id = ?",
            )
            .bind(&tour_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| query_error("座席カウンターの取得", e))
            .and_then(|row| column(&row, "confirmed_headcount"))?;

            tx.rollback()
                .await
                .map_err(|e| query_error("ロールバック", e))?;
            return Ok(ReserveOutcome::Rejected {
                remaining: max_group.saturating_sub(current),
            });
        }

        sqlx::query(&format!(
            "INSERT INTO bookings ({}, capacity_released) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE)",
            BOOKING_COLUMNS
        ))
        .bind(booking.id().to_string())
        .bind(&tour_id)
        .bind(booking.traveler_id().to_string())
        .bind(headcount)
        .bind(booking.currency().code())
        .bind(booking.offered_price().map(|p| p.amount()))
        .bind(booking.special_requests())
        .bind(booking.price_at_booking().map(|p| p.amount()))
        .bind(booking.status().as_str())
        .bind(booking.selected_start_time())
        .bind(booking.created_at())
        .bind(booking.confirmed_at())
        .bind(booking.cancelled_at())
        .bind(booking.completed_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| query_error("予約の保存", e))?;

        let after: u32 = sqlx::query(
            "SELECT confirmed_headcount FROM tour_capacity_counters WHERE tour_id = ?",
        )
        .bind(&tour_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| query_error("座席カウンターの取得", e))
        .and_then(|row| column(&row, "confirmed_headcount"))?;

        commit(tx).await?;

        Ok(ReserveOutcome::Reserved(Reservation {
            booking_id: booking.id(),
            tour_id: booking.tour_id(),
            headcount,
            confirmed_headcount_after: after,
        }))
    }

    async fn apply_transition(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut tx = self.begin().await?;

        // ステータスの比較と更新を1文で行う
        let updated = sqlx::query(
            r#"
            UPDATE bookings
            SET status = ?, price_at_booking = ?, confirmed_at = ?, cancelled_at = ?, completed_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(booking.status().as_str())
        .bind(booking.price_at_booking().map(|p| p.amount()))
        .bind(booking.confirmed_at())
        .bind(booking.cancelled_at())
        .bind(booking.completed_at())
        .bind(booking.id().to_string())
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| query_error("予約ステータスの更新", e))?;

        if updated.rows_affected() == 0 {
            let row = sqlx::query("SELECT status FROM bookings WHERE id = ?")
                .bind(booking.id().to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| query_error("予約ステータスの取得", e))?;
            tx.rollback()
                .await
                .map_err(|e| query_error("ロールバック", e))?;

            let current = match row {
                Some(r) => Some(
                    BookingStatus::from_string(column(&r, "status")?)
                        .map_err(|e| parse_failed("予約ステータス", e))?,
                ),
                None => None,
            };
            return Ok(TransitionOutcome::Stale { current });
        }

        let released = if booking.status() == BookingStatus::Cancelled {
            release_in_tx(&mut tx, booking.id(), booking.tour_id(), booking.headcount()).await?
        } else {
            false
        };

        commit(tx).await?;
        Ok(TransitionOutcome::Applied { released })
    }

    async fn release(&self, booking_id: BookingId) -> Result<bool, RepositoryError> {
        let mut tx = self.begin().await?;

        let row = sqlx::query("SELECT tour_id, headcount FROM bookings WHERE id = ? FOR UPDATE")
            .bind(booking_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| query_error("予約の取得", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| query_error("ロールバック", e))?;
            return Ok(false);
        };

        let tour_id = TourId::from_string(column(&row, "tour_id")?)
            .map_err(|e| parse_failed("ツアーID", e))?;
        let headcount: u32 = column(&row, "headcount")?;

        let released = release_in_tx(&mut tx, booking_id, tour_id, headcount).await?;
        commit(tx).await?;
        Ok(released)
    }

    async fn get(&self, booking_id: BookingId) -> Result<Option<Booking>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM bookings WHERE id = ?", BOOKING_COLUMNS))
            .bind(booking_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("予約の取得", e))?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn list_by_tour(&self, tour_id: TourId) -> Result<Vec<Booking>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bookings WHERE tour_id = ? ORDER BY created_at ASC, id ASC",
            BOOKING_COLUMNS
        ))
        .bind(tour_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("ツアーの予約一覧の取得", e))?;

        bookings_from_rows(rows)
    }

    async fn counter_for(
        &self,
        tour_id: TourId,
        max_group: u32,
    ) -> Result<TourCapacityCounter, RepositoryError> {
        let row = sqlx::query(
            "SELECT confirmed_headcount FROM tour_capacity_counters WHERE tour_id = ?",
        )
        .bind(tour_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("座席カウンターの取得", e))?;

        let confirmed = match row {
            Some(r) => column::<u32>(&r, "confirmed_headcount")?,
            None => 0,
        };
        Ok(TourCapacityCounter::new(tour_id, max_group, confirmed))
    }

    async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bookings WHERE status = ? AND created_at <= ? \
             ORDER BY created_at ASC LIMIT ?",
            BOOKING_COLUMNS
        ))
        .bind(BookingStatus::Pending.as_str())
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("期限切れ仮押さえの取得", e))?;

        bookings_from_rows(rows)
    }

    async fn query(
        &self,
        criteria: &BookingCriteria,
    ) -> Result<(Vec<Booking>, u64), RepositoryError> {
        let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) AS total FROM bookings");
        push_filters(&mut count, criteria);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_error("予約件数の取得", e))
            .and_then(|row| column(&row, "total"))?;

        let mut select = QueryBuilder::<MySql>::new(format!("SELECT {} FROM bookings", BOOKING_COLUMNS));
        push_filters(&mut select, criteria);
        // 並び替え項目は列挙型から得たカラム名のみ
        select
            .push(" ORDER BY ")
            .push(criteria.sort_by.column())
            .push(" ")
            .push(criteria.sort_order.as_sql())
            .push(", id ASC LIMIT ")
            .push_bind(criteria.limit)
            .push(" OFFSET ")
            .push_bind(criteria.offset);

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error("予約の検索", e))?;

        Ok((bookings_from_rows(rows)?, total.max(0) as u64))
    }

    fn next_identity(&self) -> BookingId {
        BookingId::new()
    }
}
