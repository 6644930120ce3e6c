//! Authentication and authorization
//!
//! Bearer tokens carry the user id, role and, for staff, the pg_admin they
//! work for. The middleware turns validated claims into an [`Actor`].

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use core_kernel::{Actor, ActorRole, UserId};

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Role label (`pg_admin`, `pg_staff`, `superuser`, ...)
    pub role: String,
    /// For staff, the pg_admin account they act for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_admin_id: Option<Uuid>,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid claims: {0}")]
    InvalidClaims(String),
    #[error("Missing permission: {0}")]
    MissingPermission(String),
}

impl Claims {
    /// The actor these claims authenticate
    pub fn actor(&self) -> Result<Actor, AuthError> {
        let user_id: UserId = self
            .sub
            .parse()
            .map_err(|_| AuthError::InvalidClaims(format!("subject '{}' is not a user id", self.sub)))?;
        let role: ActorRole = self
            .role
            .parse()
            .map_err(|_| AuthError::InvalidClaims(format!("unknown role '{}'", self.role)))?;

        match role {
            ActorRole::PgStaff => {
                let admin = self
                    .pg_admin_id
                    .ok_or_else(|| AuthError::InvalidClaims("staff token without pg_admin_id".to_string()))?;
                Ok(Actor::staff(user_id, UserId::from_uuid(admin)))
            }
            // Tokens never authenticate background jobs
            ActorRole::System => Err(AuthError::InvalidClaims("system role is not issuable".to_string())),
            role => Ok(Actor {
                user_id: Some(user_id),
                role,
                pg_admin_id: None,
            }),
        }
    }
}

/// Creates a new JWT token for `actor`
///
/// # Arguments
///
/// * `actor` - The authenticated user
/// * `secret` - JWT secret key
/// * `expiration_secs` - Token validity in seconds
pub fn create_token(actor: &Actor, secret: &str, expiration_secs: u64) -> Result<String, AuthError> {
    let user_id = actor.user_id.ok_or(AuthError::InvalidToken)?;
    let now = Utc::now();
    let exp = now + Duration::seconds(expiration_secs as i64);

    let claims = Claims {
        sub: user_id.as_uuid().to_string(),
        role: actor.role.as_str().to_string(),
        pg_admin_id: actor.pg_admin_id.map(Uuid::from),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Validates a JWT token
///
/// # Arguments
///
/// * `token` - The JWT token to validate
/// * `secret` - JWT secret key
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

/// Only platform superusers may trigger the billing jobs by hand
pub fn require_job_runner(actor: &Actor) -> Result<(), AuthError> {
    if actor.role == ActorRole::Superuser {
        Ok(())
    } else {
        Err(AuthError::MissingPermission("jobs:run".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_admin_token_round_trip() {
        let actor = Actor::admin(UserId::new());
        let token = create_token(&actor, SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.actor().unwrap(), actor);
    }

    #[test]
    fn test_staff_token_resolves_owner() {
        let admin = UserId::new();
        let actor = Actor::staff(UserId::new(), admin);
        let token = create_token(&actor, SECRET, 60).unwrap();
        let resolved = validate_token(&token, SECRET).unwrap().actor().unwrap();
        assert_eq!(resolved.owner_id(), Some(admin.into()));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = create_token(&Actor::admin(UserId::new()), SECRET, 60).unwrap();
        assert!(matches!(validate_token(&token, "other"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_staff_claims_need_admin() {
        let claims = Claims {
            sub: Uuid::now_v7().to_string(),
            role: "pg_staff".into(),
            pg_admin_id: None,
            exp: 0,
            iat: 0,
        };
        assert!(matches!(claims.actor(), Err(AuthError::InvalidClaims(_))));
    }

    #[test]
    fn test_only_superuser_runs_jobs() {
        assert!(require_job_runner(&Actor::superuser(UserId::new())).is_ok());
        assert!(require_job_runner(&Actor::admin(UserId::new())).is_err());
    }
}
