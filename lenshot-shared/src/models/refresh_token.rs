/// Refresh-token records with rotation and family revocation
///
/// A login creates a token *family* (one `family_id` per session). Each
/// refresh rotates the token: the presented record is revoked and a new
/// record in the same family is issued, in that order, both as single
/// conditional statements.
///
/// Replay of an already-rotated token is the signature of a stolen token:
/// the whole family is revoked and the caller gets a generic
/// unauthenticated failure.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE refresh_tokens (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     family_id UUID NOT NULL,
///     token_hash VARCHAR(64) NOT NULL UNIQUE,
///     issued_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     expires_at TIMESTAMPTZ NOT NULL,
///     revoked BOOLEAN NOT NULL DEFAULT FALSE,
///     revoked_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Stored refresh-token record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    /// Unique record ID
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Session family this token belongs to
    pub family_id: Uuid,

    /// SHA-256 hash of the opaque token (never the token itself)
    pub token_hash: String,

    /// When the token was issued
    pub issued_at: DateTime<Utc>,

    /// When the token expires
    pub expires_at: DateTime<Utc>,

    /// Whether the token has been revoked (rotation or logout)
    pub revoked: bool,

    /// When the token was revoked
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Outcome of attempting to consume a refresh token for rotation
#[derive(Debug)]
pub enum ConsumeOutcome {
    /// The token was live and is now revoked; rotation may proceed
    Rotated(RefreshTokenRecord),

    /// The token exists but was already revoked: replay. The whole family
    /// has been revoked as a stolen-token defense.
    ReplayDetected { family_id: Uuid, user_id: Uuid },

    /// No such token (or it has expired)
    Unknown,
}

impl RefreshTokenRecord {
    /// Inserts a new record
    ///
    /// `family_id` groups tokens of one session: the first token of a login
    /// starts a fresh family, rotations reuse the presented token's family.
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        family_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            INSERT INTO refresh_tokens (user_id, family_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, family_id, token_hash, issued_at, expires_at, revoked, revoked_at
            "#,
        )
        .bind(user_id)
        .bind(family_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    /// Consumes a token for rotation
    ///
    /// The live path is one conditional update: revoke the record keyed on
    /// `revoked = FALSE AND expires_at > NOW()`. Zero rows means either the
    /// token is unknown/expired, or it exists but was already rotated; the
    /// latter triggers family revocation before reporting replay.
    pub async fn consume(pool: &PgPool, token_hash: &str) -> Result<ConsumeOutcome, sqlx::Error> {
        let rotated = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE token_hash = $1 AND revoked = FALSE AND expires_at > NOW()
            RETURNING id, user_id, family_id, token_hash, issued_at, expires_at, revoked, revoked_at
            "#,
        )
        .bind(token_hash)
        .fetch_optional(pool)
        .await?;

        if let Some(record) = rotated {
            return Ok(ConsumeOutcome::Rotated(record));
        }

        // Distinguish replay from garbage: a revoked, unexpired record means
        // someone is presenting a token that was already rotated away.
        let replayed = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, user_id, family_id, token_hash, issued_at, expires_at, revoked, revoked_at
            FROM refresh_tokens
            WHERE token_hash = $1 AND revoked = TRUE AND expires_at > NOW()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(pool)
        .await?;

        match replayed {
            Some(record) => {
                Self::revoke_family(pool, record.family_id).await?;
                Ok(ConsumeOutcome::ReplayDetected {
                    family_id: record.family_id,
                    user_id: record.user_id,
                })
            }
            None => Ok(ConsumeOutcome::Unknown),
        }
    }

    /// Revokes a single token by hash (logout)
    ///
    /// Idempotent: revoking an already-revoked or unknown token is a no-op.
    pub async fn revoke_by_hash(pool: &PgPool, token_hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE token_hash = $1 AND revoked = FALSE
            "#,
        )
        .bind(token_hash)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Revokes every token in a family
    pub async fn revoke_family(pool: &PgPool, family_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE family_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(family_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Revokes every token belonging to a user (password change, account action)
    pub async fn revoke_all_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE user_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes expired records (periodic cleanup)
    pub async fn delete_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= NOW()")
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_outcome_shapes() {
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            token_hash: "a".repeat(64),
            issued_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(30),
            revoked: true,
            revoked_at: Some(Utc::now()),
        };

        let outcome = ConsumeOutcome::Rotated(record.clone());
        assert!(matches!(outcome, ConsumeOutcome::Rotated(_)));

        let outcome = ConsumeOutcome::ReplayDetected {
            family_id: record.family_id,
            user_id: record.user_id,
        };
        assert!(matches!(outcome, ConsumeOutcome::ReplayDetected { .. }));
    }
}
