//! Task token issuance and validation.
//!
//! Every enqueued task carries an HS256-signed JWT scoped to the user
//! on whose behalf it runs. The worker resolves the token back to a
//! task-scoped [`Identity`] before calling any orchestrator operation,
//! so callback authority is exactly the authority of the original
//! caller, time-bounded by the token's expiry.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nimbus_core::error::CoreError;
use nimbus_core::identity::Identity;

use crate::settings::TokenConfig;

/// Scope claim value for task tokens; anything else is rejected.
const TASK_SCOPE: &str = "task";

/// JWT claims embedded in every task token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject -- the user the task acts on behalf of.
    pub sub: String,
    /// Token scope; always `"task"` for tokens we issue.
    pub scope: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Unique token identifier (UUID v4) for audit.
    pub jti: String,
}

/// Generate an HS256 task token acting on behalf of `user`.
pub fn issue_task_token(user: &str, config: &TokenConfig) -> Result<String, CoreError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user.to_string(),
        scope: TASK_SCOPE.to_string(),
        exp: now + config.expiry_mins * 60,
        iat: now,
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| CoreError::Internal(format!("failed to sign task token: {e}")))
}

/// Validate a task token and resolve it to a task-scoped identity.
///
/// Validates the signature and expiration, and rejects tokens whose
/// scope claim is not `"task"`.
pub fn validate_task_token(token: &str, config: &TokenConfig) -> Result<Identity, CoreError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(), // HS256, validates exp
    )
    .map_err(|e| CoreError::Unauthorized(format!("invalid task token: {e}")))?;

    let claims = token_data.claims;
    if claims.scope != TASK_SCOPE {
        return Err(CoreError::Unauthorized(format!(
            "unexpected token scope: {}",
            claims.scope
        )));
    }
    Ok(Identity::task(claims.sub))
}
