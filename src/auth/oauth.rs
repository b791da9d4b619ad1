//! Google sign-in through the OAuth2 authorization code flow with PKCE.

use std::{borrow::Cow, time::Duration};

use anyhow::Context;
use axum::async_trait;
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, AuthorizationCode, ClientId,
    ClientSecret, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::{config::OAuthConfig, error::AppError};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPES: [&str; 3] = ["openid", "email", "profile"];

/// What the redirect leg hands to the browser and keeps for the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

/// Identity claims returned by the provider's userinfo endpoint.
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub claims: Value,
}

impl UserInfo {
    /// The email claim, unless the provider marks it unverified.
    pub fn email(&self) -> Option<String> {
        if self.claims.get("email_verified").and_then(Value::as_bool) == Some(false) {
            return None;
        }
        self.claims
            .get("email")
            .and_then(Value::as_str)
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
    }

    pub fn name(&self) -> Option<String> {
        self.claims
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// State carried from the redirect leg to the callback in a signed cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub csrf_state: String,
    pub pkce_verifier: String,
    pub redirect_url: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorize(&self, redirect_url: &str) -> Result<AuthorizationRequest, AppError>;
    async fn exchange(
        &self,
        code: &str,
        pkce_verifier: &str,
        redirect_url: &str,
    ) -> Result<UserInfo, AppError>;
}

pub struct GoogleProvider {
    client: BasicClient,
    http: reqwest::Client,
    userinfo_url: String,
    timeout: Duration,
}

impl GoogleProvider {
    pub fn new(client_id: &str, client_secret: &str, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_endpoints(
            client_id,
            client_secret,
            timeout,
            GOOGLE_TOKEN_URL,
            GOOGLE_USERINFO_URL,
        )
    }

    /// Same flow against other token and userinfo endpoints.
    pub fn with_endpoints(
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
        token_url: &str,
        userinfo_url: &str,
    ) -> anyhow::Result<Self> {
        let client = BasicClient::new(
            ClientId::new(client_id.to_string()),
            Some(ClientSecret::new(client_secret.to_string())),
            AuthUrl::new(GOOGLE_AUTH_URL.to_string())?,
            Some(TokenUrl::new(token_url.to_string()).context("parse token url")?),
        );
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build userinfo http client")?;
        Ok(Self {
            client,
            http,
            userinfo_url: userinfo_url.to_string(),
            timeout,
        })
    }

    async fn exchange_inner(
        &self,
        code: &str,
        pkce_verifier: &str,
        redirect_url: &str,
    ) -> anyhow::Result<Value> {
        let redirect = RedirectUrl::new(redirect_url.to_string()).context("parse redirect url")?;
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .set_redirect_uri(Cow::Owned(redirect))
            .request_async(async_http_client)
            .await
            .context("exchange authorization code")?;

        let res = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .context("userinfo request")?;
        anyhow::ensure!(
            res.status().is_success(),
            "userinfo returned {}",
            res.status()
        );
        res.json::<Value>().await.context("decode userinfo")
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorize(&self, redirect_url: &str) -> Result<AuthorizationRequest, AppError> {
        let redirect = RedirectUrl::new(redirect_url.to_string()).map_err(|e| {
            warn!(error = %e, redirect_url, "invalid oauth redirect url");
            AppError::AuthenticationFailed
        })?;
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, csrf) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .set_pkce_challenge(challenge)
            .set_redirect_uri(Cow::Owned(redirect))
            .url();
        Ok(AuthorizationRequest {
            url: url.to_string(),
            csrf_state: csrf.secret().clone(),
            pkce_verifier: verifier.secret().clone(),
        })
    }

    async fn exchange(
        &self,
        code: &str,
        pkce_verifier: &str,
        redirect_url: &str,
    ) -> Result<UserInfo, AppError> {
        let outcome = tokio::time::timeout(
            self.timeout,
            self.exchange_inner(code, pkce_verifier, redirect_url),
        )
        .await;
        match outcome {
            Ok(Ok(claims)) => {
                info!("oauth exchange succeeded");
                Ok(UserInfo { claims })
            }
            Ok(Err(e)) => {
                warn!(error = ?e, "oauth exchange failed");
                Err(AppError::AuthenticationFailed)
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "oauth exchange timed out");
                Err(AppError::AuthenticationFailed)
            }
        }
    }
}

/// Stands in when no client credentials are configured.
pub struct DisabledProvider;

#[async_trait]
impl IdentityProvider for DisabledProvider {
    fn authorize(&self, _redirect_url: &str) -> Result<AuthorizationRequest, AppError> {
        warn!("google login requested but oauth is not configured");
        Err(AppError::AuthenticationFailed)
    }

    async fn exchange(
        &self,
        _code: &str,
        _pkce_verifier: &str,
        _redirect_url: &str,
    ) -> Result<UserInfo, AppError> {
        Err(AppError::AuthenticationFailed)
    }
}

pub fn provider_from_config(cfg: &OAuthConfig) -> anyhow::Result<Box<dyn IdentityProvider>> {
    match (&cfg.client_id, &cfg.client_secret) {
        (Some(id), Some(secret)) => Ok(Box::new(GoogleProvider::new(
            id,
            secret,
            Duration::from_secs(cfg.timeout_secs),
        )?)),
        _ => {
            warn!("GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET not set; google login disabled");
            Ok(Box::new(DisabledProvider))
        }
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;

    /// Provider with a fixed state value and a canned exchange result.
    pub struct ScriptedProvider {
        pub claims: Option<Value>,
    }

    pub const FIXED_STATE: &str = "fixed-state";

    #[async_trait]
    impl IdentityProvider for ScriptedProvider {
        fn authorize(&self, redirect_url: &str) -> Result<AuthorizationRequest, AppError> {
            Ok(AuthorizationRequest {
                url: format!("https://idp.test/authorize?state={FIXED_STATE}&redirect_uri={redirect_url}"),
                csrf_state: FIXED_STATE.into(),
                pkce_verifier: "verifier".into(),
            })
        }

        async fn exchange(
            &self,
            code: &str,
            verifier: &str,
            _redirect_url: &str,
        ) -> Result<UserInfo, AppError> {
            if code != "good-code" || verifier != "verifier" {
                return Err(AppError::AuthenticationFailed);
            }
            match &self.claims {
                Some(claims) => Ok(UserInfo { claims: claims.clone() }),
                None => Err(AppError::AuthenticationFailed),
            }
        }
    }
}
