//! Signed actor tokens. Identity management itself lives elsewhere; the
//! gateway hands us an HMAC-SHA256-signed header describing who is
//! calling, and we verify the signature and freshness here.
//!
//! Header format: `Authorization: sig <payload>.<hex hmac>` where the
//! payload is urlencoded `id=..&role=..&issued_at=..` and the MAC is
//! HMAC-SHA256(secret, payload).

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum token age before it's considered expired (24 hours).
const MAX_TOKEN_AGE_SECS: i64 = 86400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Staff,
    Owner,
    Admin,
}

impl Role {
    fn parse(s: &str) -> Option<Role> {
        match s {
            "customer" => Some(Role::Customer),
            "staff" => Some(Role::Staff),
            "owner" => Some(Role::Owner),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

/// Verify a signed payload and extract the actor, rejecting stale tokens.
pub fn verify_token(token: &str, secret: &str, now_ts: i64) -> Option<Actor> {
    let (payload, given_mac) = token.rsplit_once('.')?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());
    if computed != given_mac {
        tracing::warn!("actor token signature mismatch");
        return None;
    }

    let params: BTreeMap<String, String> = url::form_urlencoded::parse(payload.as_bytes())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let issued_at: i64 = params.get("issued_at")?.parse().ok()?;
    if now_ts - issued_at > MAX_TOKEN_AGE_SECS {
        tracing::warn!(issued_at, "actor token expired");
        return None;
    }

    let id: i64 = params.get("id")?.parse().ok()?;
    let role = Role::parse(params.get("role")?)?;
    Some(Actor { id, role })
}

/// Test-side counterpart to `verify_token`.
#[cfg(test)]
pub fn sign_token(id: i64, role: &str, issued_at: i64, secret: &str) -> String {
    let payload: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("id", &id.to_string())
        .append_pair("issued_at", &issued_at.to_string())
        .append_pair("role", role)
        .finish();
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(payload.as_bytes());
    format!("{}.{}", payload, hex::encode(mac.finalize().into_bytes()))
}

/// Extract the actor from an `Authorization: sig <token>` header.
pub fn actor_from_header(auth_header: &str, secret: &str, now_ts: i64) -> Option<Actor> {
    let token = auth_header.strip_prefix("sig ")?;
    verify_token(token, secret, now_ts)
}

/// Salon-scoped mutation rights: platform admins always pass; owners must
/// own the salon; staff must be an active member of it.
pub async fn authorize_salon_manager(
    db: &SqlitePool,
    actor: Actor,
    salon_id: i64,
) -> Result<(), ApiError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Owner => {
            let owns: bool = sqlx::query_scalar(
                "SELECT COUNT(*) > 0 FROM salons WHERE id = ? AND owner_id = ?",
            )
            .bind(salon_id)
            .bind(actor.id)
            .fetch_one(db)
            .await?;
            if owns {
                Ok(())
            } else {
                Err(ApiError::Forbidden("not the salon owner".into()))
            }
        }
        Role::Staff => {
            let member: bool = sqlx::query_scalar(
                "SELECT COUNT(*) > 0 FROM staff
                 WHERE salon_id = ? AND user_id = ? AND is_active = 1",
            )
            .bind(salon_id)
            .bind(actor.id)
            .fetch_one(db)
            .await?;
            if member {
                Ok(())
            } else {
                Err(ApiError::Forbidden("not a staff member of this salon".into()))
            }
        }
        Role::Customer => Err(ApiError::Forbidden("customers cannot manage salons".into())),
    }
}

/// Owner-or-admin rights for schedule and catalog management.
pub async fn authorize_salon_owner(
    db: &SqlitePool,
    actor: Actor,
    salon_id: i64,
) -> Result<(), ApiError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Owner => {
            let owns: bool = sqlx::query_scalar(
                "SELECT COUNT(*) > 0 FROM salons WHERE id = ? AND owner_id = ?",
            )
            .bind(salon_id)
            .bind(actor.id)
            .fetch_one(db)
            .await?;
            if owns {
                Ok(())
            } else {
                Err(ApiError::Forbidden("not the salon owner".into()))
            }
        }
        _ => Err(ApiError::Forbidden("owner or admin required".into())),
    }
}

// ── Tests ──
