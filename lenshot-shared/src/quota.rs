/// Plan-quota enforcement
///
/// A capture request reserves its unit *before* any external work happens.
/// Reservation hands back a [`Reservation`] that must be either committed
/// (the job was admitted, the unit is spent) or released (the request was
/// rejected after reservation, e.g. by URL safety). Both consume the value,
/// so double-release is a compile error rather than a runtime bug.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::usage::UsageCounter;
use crate::plans::{Plan, PlanLimits};

/// Quota failures
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// The user has no headroom left in the current period
    #[error("monthly capture quota of {limit} exhausted")]
    Exceeded { limit: i32 },

    /// Persistence fault
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One reserved capture unit
///
/// Not `Clone`: exactly one of [`commit`](Reservation::commit) or
/// [`release`](Reservation::release) can ever run.
#[derive(Debug)]
pub struct Reservation {
    user_id: Uuid,
    /// Post-reservation consumption in the current period
    pub used: i32,
    /// The plan limit the reservation was checked against
    pub limit: i32,
}

impl Reservation {
    /// Keeps the reserved unit: the capture attempt went ahead
    pub fn commit(self) {}

    /// Returns the unit: the request was rejected after reservation
    pub async fn release(self, pool: &PgPool) -> Result<(), sqlx::Error> {
        UsageCounter::release(pool, self.user_id).await
    }
}

/// Atomically reserves one capture unit for `user_id` under `plan`
///
/// Exactly one of N concurrent callers gets the last unit; the rest see
/// [`QuotaError::Exceeded`].
pub async fn try_reserve(
    pool: &PgPool,
    user_id: Uuid,
    plan: Plan,
) -> Result<Reservation, QuotaError> {
    let limit = PlanLimits::for_plan(plan).monthly_captures;

    match UsageCounter::try_reserve(pool, user_id, limit).await? {
        Some(counter) => Ok(Reservation {
            user_id,
            used: counter.count,
            limit,
        }),
        None => Err(QuotaError::Exceeded { limit }),
    }
}

/// Current-period usage alongside the plan limit, for the usage endpoint
pub async fn current_usage(
    pool: &PgPool,
    user_id: Uuid,
    plan: Plan,
) -> Result<(i32, i32), sqlx::Error> {
    let limit = PlanLimits::for_plan(plan).monthly_captures;
    let used = UsageCounter::current(pool, user_id).await?;
    Ok((used, limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exceeded_message_names_limit() {
        let err = QuotaError::Exceeded { limit: 100 };
        assert_eq!(err.to_string(), "monthly capture quota of 100 exhausted");
    }
}
