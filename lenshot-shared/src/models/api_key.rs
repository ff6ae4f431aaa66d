/// API key persistence
///
/// Keys are stored as SHA-256 hashes; the plaintext leaves the process
/// exactly once, in the creation response. Verification fetches the live
/// candidates sharing the key's display prefix through an index, then
/// compares hashes in constant time, so the lookup never becomes a
/// timing oracle and a revoked key fails on its very next use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::net::IpAddr;
use uuid::Uuid;

use crate::auth::api_key::{display_prefix, generate_api_key, mask_key};

/// Stored API key (hash only, never the plaintext)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKeyRecord {
    /// Unique key ID
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Human-readable label ("CI pipeline", "staging")
    pub name: String,

    /// First 10 characters of the plaintext, for recognition in listings
    pub key_prefix: String,

    /// Last 4 characters of the plaintext, for masked display
    pub last_four: String,

    /// SHA-256 hash of the full plaintext key
    #[serde(skip_serializing)]
    pub key_hash: String,

    /// Granted scopes (`screenshots:create` etc., `*` wildcards allowed)
    pub scopes: Vec<String>,

    /// Source IPs the key may be used from (None = any)
    pub ip_whitelist: Option<Vec<String>>,

    /// Target domains the key may capture (None = any)
    pub domain_whitelist: Option<Vec<String>>,

    /// Per-minute request ceiling (None = plan default)
    pub rate_limit: Option<i32>,

    /// Total successful authentications with this key
    pub usage_count: i64,

    /// When the key was created
    pub created_at: DateTime<Utc>,

    /// Last successful authentication
    pub last_used_at: Option<DateTime<Utc>>,

    /// Whether the key has been revoked
    pub revoked: bool,

    /// When the key was revoked
    pub revoked_at: Option<DateTime<Utc>>,

    /// Optional expiry
    pub expires_at: Option<DateTime<Utc>>,
}

/// Parameters for creating a key
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKey {
    pub name: String,
    pub scopes: Vec<String>,
    pub ip_whitelist: Option<Vec<String>>,
    pub domain_whitelist: Option<Vec<String>>,
    pub rate_limit: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A freshly created key: the record plus the one-time plaintext
#[derive(Debug)]
pub struct NewApiKey {
    pub record: ApiKeyRecord,
    pub plaintext: String,
}

impl ApiKeyRecord {
    /// Generates and stores a new key
    ///
    /// Returns the plaintext alongside the record; it cannot be recovered
    /// afterwards.
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        params: &CreateApiKey,
    ) -> Result<NewApiKey, sqlx::Error> {
        let (plaintext, key_hash) = generate_api_key();
        let prefix = display_prefix(&plaintext);
        let last_four = plaintext[plaintext.len() - 4..].to_string();

        let record = sqlx::query_as::<_, ApiKeyRecord>(
            r#"
            INSERT INTO api_keys
                (user_id, name, key_prefix, last_four, key_hash, scopes,
                 ip_whitelist, domain_whitelist, rate_limit, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, user_id, name, key_prefix, last_four, key_hash, scopes,
                      ip_whitelist, domain_whitelist, rate_limit, usage_count,
                      created_at, last_used_at, revoked, revoked_at, expires_at
            "#,
        )
        .bind(user_id)
        .bind(&params.name)
        .bind(&prefix)
        .bind(&last_four)
        .bind(&key_hash)
        .bind(&params.scopes)
        .bind(&params.ip_whitelist)
        .bind(&params.domain_whitelist)
        .bind(params.rate_limit)
        .bind(params.expires_at)
        .fetch_one(pool)
        .await?;

        Ok(NewApiKey { record, plaintext })
    }

    /// Lists the live keys sharing a display prefix
    ///
    /// Verification candidates: the prefix is the indexed part of the
    /// lookup, the caller picks the match by constant-time hash
    /// comparison. Revoked and expired keys are filtered in the query,
    /// so revocation takes effect on the next request with zero
    /// staleness.
    pub async fn find_active_by_prefix(
        pool: &PgPool,
        key_prefix: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiKeyRecord>(
            r#"
            SELECT id, user_id, name, key_prefix, last_four, key_hash, scopes,
                   ip_whitelist, domain_whitelist, rate_limit, usage_count,
                   created_at, last_used_at, revoked, revoked_at, expires_at
            FROM api_keys
            WHERE key_prefix = $1
              AND revoked = FALSE
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(key_prefix)
        .fetch_all(pool)
        .await
    }

    /// Lists a user's keys, newest first
    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiKeyRecord>(
            r#"
            SELECT id, user_id, name, key_prefix, last_four, key_hash, scopes,
                   ip_whitelist, domain_whitelist, rate_limit, usage_count,
                   created_at, last_used_at, revoked, revoked_at, expires_at
            FROM api_keys
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Revokes a key, scoped to its owner
    ///
    /// Returns `false` when the key does not exist or belongs to someone
    /// else; callers turn that into a not-found response rather than
    /// confirming the key exists.
    pub async fn revoke(pool: &PgPool, key_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET revoked = TRUE, revoked_at = NOW()
            WHERE id = $1 AND user_id = $2 AND revoked = FALSE
            "#,
        )
        .bind(key_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Bumps usage stats after a successful authentication
    ///
    /// Called off the request path; losing an increment to a crash is
    /// acceptable, blocking the request on it is not.
    pub async fn record_usage(pool: &PgPool, key_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE api_keys
            SET usage_count = usage_count + 1, last_used_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(key_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Masked display form, e.g. `lens_a1b2c...9xyz`
    pub fn masked(&self) -> String {
        mask_key(&self.key_prefix, &self.last_four)
    }

    /// Checks a client IP against the whitelist (empty/None = allow all)
    ///
    /// Entries are single addresses or CIDR blocks (`203.0.113.7`,
    /// `10.1.0.0/16`, `2001:db8::/32`). An unparseable client IP fails
    /// closed when a whitelist is set.
    pub fn allows_ip(&self, client_ip: &str) -> bool {
        let list = match &self.ip_whitelist {
            None => return true,
            Some(list) if list.is_empty() => return true,
            Some(list) => list,
        };

        let Ok(ip) = client_ip.parse::<IpAddr>() else {
            return false;
        };

        list.iter().any(|entry| entry_matches_ip(entry, ip))
    }
}

/// Whether a whitelist entry (plain address or CIDR block) covers `ip`
fn entry_matches_ip(entry: &str, ip: IpAddr) -> bool {
    let Some((net, bits)) = entry.split_once('/') else {
        return entry.parse::<IpAddr>().map(|e| e == ip).unwrap_or(false);
    };

    let (Ok(net), Ok(bits)) = (net.parse::<IpAddr>(), bits.parse::<u32>()) else {
        return false;
    };

    match (net, ip) {
        (IpAddr::V4(net), IpAddr::V4(ip)) if bits <= 32 => {
            let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
            (u32::from(net) & mask) == (u32::from(ip) & mask)
        }
        (IpAddr::V6(net), IpAddr::V6(ip)) if bits <= 128 => {
            let mask = if bits == 0 { 0 } else { u128::MAX << (128 - bits) };
            (u128::from(net) & mask) == (u128::from(ip) & mask)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(
        ip_whitelist: Option<Vec<String>>,
        domain_whitelist: Option<Vec<String>>,
    ) -> ApiKeyRecord {
        ApiKeyRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "test".to_string(),
            key_prefix: "lens_a1b2c".to_string(),
            last_four: "9xyz".to_string(),
            key_hash: "0".repeat(64),
            scopes: vec!["screenshots:create".to_string()],
            ip_whitelist,
            domain_whitelist,
            rate_limit: None,
            usage_count: 0,
            created_at: Utc::now(),
            last_used_at: None,
            revoked: false,
            revoked_at: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_allows_ip() {
        let any = record_with(None, None);
        assert!(any.allows_ip("203.0.113.7"));

        let listed = record_with(Some(vec!["203.0.113.7".to_string()]), None);
        assert!(listed.allows_ip("203.0.113.7"));
        assert!(!listed.allows_ip("203.0.113.8"));
        assert!(!listed.allows_ip("not-an-ip"));

        let empty = record_with(Some(vec![]), None);
        assert!(empty.allows_ip("198.51.100.1"));
    }

    #[test]
    fn test_allows_ip_cidr() {
        let v4 = record_with(Some(vec!["10.1.0.0/16".to_string()]), None);
        assert!(v4.allows_ip("10.1.200.5"));
        assert!(!v4.allows_ip("10.2.0.1"));

        let v6 = record_with(Some(vec!["2001:db8::/32".to_string()]), None);
        assert!(v6.allows_ip("2001:db8::42"));
        assert!(!v6.allows_ip("2001:db9::1"));

        let bad = record_with(Some(vec!["10.1.0.0/99".to_string()]), None);
        assert!(!bad.allows_ip("10.1.0.1"));
    }

    #[test]
    fn test_masked_display() {
        let record = record_with(None, None);
        assert_eq!(record.masked(), "lens_a1b2c...9xyz");
    }
}
