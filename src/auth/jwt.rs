use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{
    auth::claims::Claims,
    config::JwtConfig,
    error::AppError,
    state::AppState,
};

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub algorithm: Algorithm,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            algorithm: cfg.algorithm,
            ttl: Duration::minutes(cfg.ttl_minutes),
        }
    }

    /// Signs a token for `subject`, expiring after `ttl` (the configured TTL when `None`).
    pub fn issue(&self, subject: &str, ttl: Option<Duration>) -> anyhow::Result<String> {
        self.issue_at(subject, ttl.unwrap_or(self.ttl), OffsetDateTime::now_utc())
    }

    fn issue_at(&self, subject: &str, ttl: Duration, now: OffsetDateTime) -> anyhow::Result<String> {
        let claims = Claims {
            sub: Some(subject.to_string()),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)?;
        debug!(subject, exp = claims.exp, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            warn!(error = %e, "jwt rejected");
            AppError::InvalidToken
        })?;
        match data.claims.subject() {
            Some(sub) => debug!(subject = sub, "jwt verified"),
            None => {
                warn!("jwt without subject");
                return Err(AppError::InvalidToken);
            }
        }
        Ok(data.claims)
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.whole_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    fn make_keys(secret: &str, algorithm: Algorithm) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            algorithm,
            ttl_minutes: 15,
        })
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let keys = make_keys("dev-secret", Algorithm::HS256);
        let token = keys.issue("a@b.com", Some(Duration::minutes(1))).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.subject(), Some("a@b.com"));
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn default_ttl_comes_from_config() {
        let keys = make_keys("dev-secret", Algorithm::HS384);
        let claims = keys.verify(&keys.issue("a@b.com", None).unwrap()).unwrap();
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = make_keys("dev-secret", Algorithm::HS256);
        let issued = OffsetDateTime::now_utc() - Duration::minutes(2);
        let token = keys.issue_at("a@b.com", Duration::minutes(1), issued).unwrap();
        assert!(matches!(keys.verify(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = make_keys("one", Algorithm::HS256).issue("a@b.com", None).unwrap();
        let err = make_keys("two", Algorithm::HS256).verify(&token).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[test]
    fn algorithm_mismatch_is_rejected() {
        let token = make_keys("s", Algorithm::HS512).issue("a@b.com", None).unwrap();
        assert!(make_keys("s", Algorithm::HS256).verify(&token).is_err());
    }

    #[test]
    fn malformed_token_is_rejected() {
        let keys = make_keys("s", Algorithm::HS256);
        assert!(matches!(keys.verify("not.a.jwt"), Err(AppError::InvalidToken)));
        assert!(matches!(keys.verify(""), Err(AppError::InvalidToken)));
    }

    #[test]
    fn token_without_subject_is_rejected() {
        #[derive(Serialize)]
        struct NoSub {
            exp: i64,
        }
        let keys = make_keys("s", Algorithm::HS256);
        let exp = (OffsetDateTime::now_utc() + Duration::minutes(5)).unix_timestamp();
        let token = encode(&Header::default(), &NoSub { exp }, &keys.encoding).unwrap();
        assert!(matches!(keys.verify(&token), Err(AppError::InvalidToken)));
    }
}
