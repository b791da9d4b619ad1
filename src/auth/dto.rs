use serde::{Deserialize, Serialize};

/// Form body for local registration and login.
#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    #[serde(alias = "username")]
    pub email: String,
    pub password: String,
}

/// Bearer token handed to API clients after login.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Query string the provider sends back to `/auth`.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}
