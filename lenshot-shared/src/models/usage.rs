/// Per-user usage counters with atomic reservation
///
/// One row per user. Reservation is a single upsert that checks headroom,
/// rolls the counter over at the calendar-month boundary, and increments,
/// all inside one statement. Two callers racing for the last unit of
/// quota serialize on the row and exactly one succeeds.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Snapshot of a user's consumption in the current billing period
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsageCounter {
    pub user_id: Uuid,
    pub period_start: NaiveDate,
    pub count: i32,
}

/// First day of the current calendar month (UTC), the billing-period key
pub fn current_period_start() -> NaiveDate {
    let today = Utc::now().date_naive();
    // with_day(1) cannot fail for day 1 of an existing month
    today.with_day(1).unwrap_or(today)
}

impl UsageCounter {
    /// Atomically reserves one capture unit against `limit`
    ///
    /// Rows carrying a stale `period_start` are treated as empty and reset
    /// in the same statement, so the month rolls over lazily on first use.
    /// Returns the post-reservation counter, or `None` when the user is at
    /// their limit.
    pub async fn try_reserve(
        pool: &PgPool,
        user_id: Uuid,
        limit: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        let period = current_period_start();

        sqlx::query_as::<_, UsageCounter>(
            r#"
            INSERT INTO usage_counters (user_id, period_start, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id) DO UPDATE
            SET count = CASE
                    WHEN usage_counters.period_start < $2 THEN 1
                    ELSE usage_counters.count + 1
                END,
                period_start = CASE
                    WHEN usage_counters.period_start < $2 THEN $2
                    ELSE usage_counters.period_start
                END,
                updated_at = NOW()
            WHERE (CASE
                    WHEN usage_counters.period_start < $2 THEN 0
                    ELSE usage_counters.count
                END) < $3
            RETURNING user_id, period_start, count
            "#,
        )
        .bind(user_id)
        .bind(period)
        .bind(limit)
        .fetch_optional(pool)
        .await
    }

    /// Returns one reserved unit
    ///
    /// Only touches the current period: a reservation made just before
    /// rollover that is released just after simply evaporates, it can no
    /// longer free capacity in the new period. The floor at zero guards
    /// against a stray release driving the counter negative.
    pub async fn release(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
        let period = current_period_start();

        sqlx::query(
            r#"
            UPDATE usage_counters
            SET count = GREATEST(count - 1, 0), updated_at = NOW()
            WHERE user_id = $1 AND period_start = $2
            "#,
        )
        .bind(user_id)
        .bind(period)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Current-period consumption, without mutating anything
    ///
    /// A missing row or a stale period both read as zero.
    pub async fn current(pool: &PgPool, user_id: Uuid) -> Result<i32, sqlx::Error> {
        let period = current_period_start();

        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT count FROM usage_counters
            WHERE user_id = $1 AND period_start = $2
            "#,
        )
        .bind(user_id)
        .bind(period)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(c,)| c).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_start_is_first_of_month() {
        let period = current_period_start();
        assert_eq!(period.day(), 1);
        assert_eq!(period.month(), Utc::now().date_naive().month());
    }
}
