use serde::{Deserialize, Serialize};

use super::configuration::BackendConfig;
use crate::domain::error::CommonError;

pub const TOKEN_URI: &str = "/auth/v1/token";

/// The signed in user. Built once at the composition root and handed to every service.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub access_token: String,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[derive(Deserialize, Serialize, Debug)]
pub struct SessionUser {
    pub id: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub user: SessionUser,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug)]
pub struct SessionComponent {
    auth_url: String,
    anon_key: String,
    http: reqwest::Client,
}

impl SessionComponent {
    pub fn new(config: &BackendConfig) -> Self {
        if config.url.is_empty() {
            panic!("missing backend URL")
        }

        Self {
            auth_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            http: reqwest::Client::new(),
        }
    }

    #[tracing::instrument(name = "Sign in", skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthContext, CommonError> {
        if email.is_empty() || password.is_empty() {
            return Err(CommonError::Unauthorized(
                "Email and password are required".to_owned(),
            ));
        }

        let url = format!("{}{}", self.auth_url, TOKEN_URI);
        let response = self
            .http
            .post(url)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(|err| {
                log::error!("Session > Sign in > Couldn't reach auth service: {err}");
                CommonError::Unknown("Couldn't reach the auth service".to_owned())
            })?;

        let status = response.status();
        if status.is_client_error() {
            log::info!("Session > Sign in > Rejected credentials with status {status}");
            return Err(CommonError::Unauthorized(
                "Invalid email or password".to_owned(),
            ));
        }
        if !status.is_success() {
            log::error!("Session > Sign in > Auth service responded {status}");
            return Err(CommonError::Unknown(format!(
                "Auth service responded {status}"
            )));
        }

        match response.json::<TokenResponse>().await {
            Ok(token) => Ok(AuthContext {
                user_id: token.user.id,
                access_token: token.access_token,
            }),
            Err(err) => {
                log::error!("Session > Sign in > Unexpected token response: {err}");
                Err(CommonError::Unknown(
                    "Unexpected response from the auth service".to_owned(),
                ))
            }
        }
    }
}
