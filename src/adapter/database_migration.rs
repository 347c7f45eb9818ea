use crate::adapter::database_error::DatabaseError;
use sqlx::{MySql, Pool};
use tracing::info;

/// 起動時に実行するマイグレーション（名前, SQL）
const MIGRATIONS: [(&str, &str); 5] = [
    (
        "001_create_tours_table",
        include_str!("../../migrations/001_create_tours_table.sql"),
    ),
    (
        "002_create_tour_start_times_table",
        include_str!("../../migrations/002_create_tour_start_times_table.sql"),
    ),
    (
        "003_create_traveler_sessions_table",
        include_str!("../../migrations/003_create_traveler_sessions_table.sql"),
    ),
    (
        "004_create_tour_capacity_counters_table",
        include_str!("../../migrations/004_create_tour_capacity_counters_table.sql"),
    ),
    (
        "005_create_bookings_table",
        include_str!("../../migrations/005_create_bookings_table.sql"),
    ),
];

/// データベースマイグレーションを管理する構造体
pub struct DatabaseMigration {
    pool: Pool<MySql>,
}

impl DatabaseMigration {
    /// 新しいDatabaseMigrationインスタンスを作成
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// マイグレーションを実行
    /// べき等性を保証（CREATE TABLE IF NOT EXISTS）
    pub async fn run(&self) -> Result<(), DatabaseError> {
        for (name, migration_sql) in MIGRATIONS.iter() {
            sqlx::query(migration_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    DatabaseError::MigrationError(format!("Migration {} failed: {}", name, e))
                })?;
            info!(migration = name, "マイグレーションを適用しました");
        }

        info!(count = MIGRATIONS.len(), "全マイグレーションが完了しました");
        Ok(())
    }
}
