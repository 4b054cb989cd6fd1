//! Bearer-credential issuing, verification, and the auth middleware.
//!
//! Tokens are self-describing: `base64url(claims JSON) . base64url(HMAC)`
//! signed with the server secret, carrying `{user_id, username, issued_at}`
//! and expiring after the configured interval. The admin flag is **not**
//! part of the claims; it is re-fetched from the store on every request.
//!
//! Because browser media elements cannot attach headers to sub-requests,
//! the same validator accepts the token from either the `Authorization`
//! header or a `token` query parameter. Logs only ever see a fingerprint.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use streambox_core::{Error, Result, UserId};

use super::context::AppContext;
use super::error::AppError;
use crate::sources::secrets::fingerprint;

type HmacSha256 = Hmac<Sha256>;

/// Password-hash cost; bcrypt's default of 12 satisfies the ≥ 10 floor.
pub const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Claims carried inside a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: i64,
    pub username: String,
    /// Unix seconds.
    pub issued_at: u64,
}

/// The request's authenticated identity, injected into extensions by
/// [`auth_middleware`]. `is_admin` is fresh from the store.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub username: String,
    pub is_admin: bool,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs()
}

fn sign(secret: &str, payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Issue a signed bearer token for a user.
pub fn issue_token(secret: &str, user_id: UserId, username: &str) -> String {
    let claims = TokenClaims {
        user_id: user_id.as_i64(),
        username: username.to_string(),
        issued_at: now_secs(),
    };
    let payload = serde_json::to_vec(&claims).expect("claims serialize");
    let payload_b64 = URL_SAFE_NO_PAD.encode(&payload);
    let sig_b64 = URL_SAFE_NO_PAD.encode(sign(secret, payload_b64.as_bytes()));
    format!("{payload_b64}.{sig_b64}")
}

/// Verify a token's signature and expiry, returning its claims.
pub fn verify_token(secret: &str, token: &str, expiry: Duration) -> Result<TokenClaims> {
    let (payload_b64, sig_b64) = token
        .split_once('.')
        .ok_or_else(|| Error::Forbidden("malformed token".into()))?;

    let given_sig = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| Error::Forbidden("malformed token signature".into()))?;

    // Constant-time comparison via the Mac verifier.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(payload_b64.as_bytes());
    if mac.verify_slice(&given_sig).is_err() {
        tracing::debug!(token = %fingerprint(token), "Token signature rejected");
        return Err(Error::Forbidden("invalid token signature".into()));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| Error::Forbidden("malformed token payload".into()))?;
    let claims: TokenClaims = serde_json::from_slice(&payload)
        .map_err(|_| Error::Forbidden("malformed token claims".into()))?;

    let age = now_secs().saturating_sub(claims.issued_at);
    if age > expiry.as_secs() {
        tracing::debug!(token = %fingerprint(token), "Token expired");
        return Err(Error::Forbidden("token expired".into()));
    }

    Ok(claims)
}

/// Pull a token out of the `Authorization` header or `token` query param.
fn extract_token(request: &Request<Body>) -> Option<String> {
    if let Some(header) = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    request.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            pair.strip_prefix("token=")
                .map(|value| value.to_string())
        })
    })
}

/// Resolve a token to a fresh [`AuthUser`], re-reading `is_admin` from the
/// store rather than trusting the claims.
pub fn resolve_user(ctx: &AppContext, token: &str) -> Result<AuthUser> {
    let claims = verify_token(
        &ctx.config.auth.secret,
        token,
        Duration::from_secs(ctx.config.auth.token_expiry_days * 24 * 3600),
    )?;

    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let user = streambox_db::queries::users::get_user_by_id(&conn, UserId::new(claims.user_id))?
        .ok_or_else(|| Error::Forbidden("user no longer exists".into()))?;

    Ok(AuthUser {
        id: user.id,
        username: user.username,
        is_admin: user.is_admin,
    })
}

/// Authentication middleware applied to every protected route.
///
/// Missing credential → 401; present-but-invalid → 403.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<Body>,
    next: Next,
) -> std::result::Result<Response, AppError> {
    let token = extract_token(&request)
        .ok_or_else(|| Error::Unauthorized("missing bearer credential".into()))?;

    let user = resolve_user(&ctx, &token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Gate for `/admin/*` handlers.
pub fn require_admin(user: &AuthUser) -> Result<()> {
    if user.is_admin {
        Ok(())
    } else {
        Err(Error::Forbidden("administrator access required".into()))
    }
}

/// Hash a password with bcrypt.
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| Error::Internal(format!("password hashing failed: {e}")))
}

/// Verify a password against its stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Generate a random server secret (hex).
pub fn generate_secret() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";
    const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

    #[test]
    fn issue_verify_roundtrip() {
        let token = issue_token(SECRET, UserId::new(7), "alice");
        let claims = verify_token(SECRET, &token, WEEK).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(SECRET, UserId::new(1), "bob");
        assert!(verify_token("other-secret", &token, WEEK).is_err());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = issue_token(SECRET, UserId::new(1), "bob");
        let (payload, sig) = token.split_once('.').unwrap();

        // Forge a payload claiming another user id, keep the old signature.
        let mut claims: TokenClaims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        claims.user_id = 999;
        let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());

        assert!(verify_token(SECRET, &format!("{forged}.{sig}"), WEEK).is_err());
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert!(verify_token(SECRET, "", WEEK).is_err());
        assert!(verify_token(SECRET, "no-dot-here", WEEK).is_err());
        assert!(verify_token(SECRET, "a.b", WEEK).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token(SECRET, UserId::new(1), "bob");
        assert!(verify_token(SECRET, &token, Duration::ZERO).is_err());
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn generated_secrets_are_unique() {
        assert_ne!(generate_secret(), generate_secret());
        assert_eq!(generate_secret().len(), 64);
    }
}
