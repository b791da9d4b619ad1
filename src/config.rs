use std::str::FromStr;

use anyhow::Context;
use jsonwebtoken::Algorithm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => anyhow::bail!("unknown ENVIRONMENT {other:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Raw signing key material, at least 64 bytes.
    pub secret: Vec<u8>,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub environment: Environment,
    pub static_dir: String,
    pub cors_origin: String,
    pub jwt: JwtConfig,
    pub oauth: OAuthConfig,
    pub session: SessionConfig,
}

pub const MIN_SESSION_KEY_LEN: usize = 64;

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let environment = match std::env::var("ENVIRONMENT") {
            Ok(v) => v.parse()?,
            Err(_) => Environment::Development,
        };

        let jwt = JwtConfig {
            secret: std::env::var("SECRET_KEY").context("SECRET_KEY is not set")?,
            algorithm: parse_algorithm(
                &std::env::var("ALGORITHM").unwrap_or_else(|_| "HS256".into()),
            )?,
            ttl_minutes: positive_env("ACCESS_TOKEN_EXPIRE_MINUTES", 15)?,
        };

        let oauth = OAuthConfig {
            client_id: non_empty_var("GOOGLE_CLIENT_ID"),
            client_secret: non_empty_var("GOOGLE_CLIENT_SECRET"),
            redirect_url: non_empty_var("OAUTH_REDIRECT_URL"),
            timeout_secs: positive_env("OAUTH_TIMEOUT_SECS", 10)?,
        };

        let secret = std::env::var("SESSION_SECRET_KEY")
            .context("SESSION_SECRET_KEY is not set")?
            .into_bytes();
        anyhow::ensure!(
            secret.len() >= MIN_SESSION_KEY_LEN,
            "SESSION_SECRET_KEY must be at least {MIN_SESSION_KEY_LEN} bytes"
        );
        let session = SessionConfig {
            secret,
            ttl_minutes: positive_env("SESSION_TTL_MINUTES", 60 * 24 * 14)?,
        };

        Ok(Self {
            database_url,
            environment,
            static_dir: std::env::var("STATIC_DIR").unwrap_or_else(|_| "static".into()),
            cors_origin: std::env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:8000".into()),
            jwt,
            oauth,
            session,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Only the HMAC family is accepted since the key is a shared secret.
pub fn parse_algorithm(raw: &str) -> anyhow::Result<Algorithm> {
    let alg = Algorithm::from_str(raw.trim())
        .map_err(|_| anyhow::anyhow!("unknown ALGORITHM {raw:?}"))?;
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(alg),
        other => anyhow::bail!("ALGORITHM {other:?} needs a key pair; use HS256, HS384 or HS512"),
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Numeric setting that must be greater than zero; unset means `default`.
fn positive_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_positive(key, non_empty_var(key), default)
}

fn parse_positive<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<T>()
        .with_context(|| format!("{key} is not a number: {raw:?}"))?;
    anyhow::ensure!(value > T::default(), "{key} must be greater than zero");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hmac_algorithms() {
        assert_eq!(parse_algorithm("HS256").unwrap(), Algorithm::HS256);
        assert_eq!(parse_algorithm(" HS512 ").unwrap(), Algorithm::HS512);
    }

    #[test]
    fn rejects_asymmetric_and_unknown_algorithms() {
        assert!(parse_algorithm("RS256").is_err());
        assert!(parse_algorithm("none").is_err());
    }

    #[test]
    fn numeric_settings_default_when_unset() {
        assert_eq!(parse_positive::<i64>("SESSION_TTL_MINUTES", None, 60).unwrap(), 60);
        assert_eq!(
            parse_positive::<u64>("OAUTH_TIMEOUT_SECS", Some(" 3 ".into()), 10).unwrap(),
            3
        );
    }

    #[test]
    fn numeric_settings_reject_garbage_and_non_positive() {
        let err = parse_positive::<i64>("ACCESS_TOKEN_EXPIRE_MINUTES", Some("abc".into()), 15)
            .unwrap_err();
        assert!(err.to_string().contains("ACCESS_TOKEN_EXPIRE_MINUTES"));
        assert!(parse_positive::<i64>("ACCESS_TOKEN_EXPIRE_MINUTES", Some("-5".into()), 15).is_err());
        assert!(parse_positive::<i64>("SESSION_TTL_MINUTES", Some("0".into()), 15).is_err());
        assert!(parse_positive::<u64>("OAUTH_TIMEOUT_SECS", Some("-1".into()), 10).is_err());
    }

    #[test]
    fn environment_from_str() {
        assert_eq!("development".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
    }
}
