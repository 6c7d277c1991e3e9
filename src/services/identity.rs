use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::{
    db::UserStore,
    error::{AppError, AppResult},
    models::User,
};

/// Identity claims returned by the external token verifier.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    #[serde(rename = "sub")]
    pub subject_id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Black-box federated-identity verifier: opaque token in, claims out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> AppResult<IdentityClaims>;
}

/// Google tokeninfo-style verifier.
#[derive(Clone)]
pub struct TokeninfoVerifier {
    http_client: HttpClient,
    tokeninfo_url: String,
}

impl TokeninfoVerifier {
    pub fn new(tokeninfo_url: String) -> Self {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            tokeninfo_url,
        }
    }
}

#[async_trait]
impl IdentityVerifier for TokeninfoVerifier {
    async fn verify(&self, token: &str) -> AppResult<IdentityClaims> {
        let response = self
            .http_client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Unauthorized("Invalid identity token".to_string()));
        }

        let claims: IdentityClaims = response
            .json()
            .await
            .map_err(|_| AppError::Unauthorized("Malformed identity response".to_string()))?;

        Ok(claims)
    }
}

/// Loads the user for verified claims, creating a record with empty
/// preference maps on first sight of the subject id.
pub async fn provision_user(users: &Arc<dyn UserStore>, claims: &IdentityClaims) -> AppResult<User> {
    if let Some(user) = users.fetch(&claims.subject_id).await? {
        return Ok(user);
    }

    let display_name = claims.name.clone().unwrap_or_else(|| claims.email.clone());
    let mut user = User::new(&claims.subject_id, &claims.email, &display_name);
    user.picture_url = claims.picture.clone();
    users.upsert(&user).await?;

    tracing::info!(subject = %claims.subject_id, "Provisioned new user");

    Ok(user)
}
