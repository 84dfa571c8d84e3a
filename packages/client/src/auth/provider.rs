//! OpenID Connect provider client.
//!
//! Only the pieces the authorization-code flow needs: discovery, code
//! exchange, refresh, userinfo and the logout URL.

use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, Validation};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::config::IdentityConfig;
use crate::error::AuthError;

use super::pkce::{AuthorizationRequest, build_authorization_url};

/// Subset of the discovery document (`.well-known/openid-configuration`)
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

fn parse_endpoint(name: &str, value: &str) -> Result<Url, AuthError> {
    Url::parse(value).map_err(|e| AuthError::Discovery(format!("invalid {name} '{value}': {e}")))
}

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Profile claims, from the userinfo endpoint or the id token
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

/// Decode the claims of an id token without verifying its signature.
///
/// The token comes straight from the token endpoint over the back channel,
/// so it is only read for profile data.
pub fn decode_id_token_claims(id_token: &str) -> Result<UserInfo, AuthError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<UserInfo>(id_token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::Profile(format!("id token: {e}")))
}

/// Identity provider seam used by the session manager
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the user must open to sign in.
    async fn authorization_url(&self, code_challenge: &str, state: &str)
    -> Result<Url, AuthError>;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError>;

    /// Obtain fresh tokens with a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;

    /// Load the profile; `None` when the provider has no userinfo endpoint.
    async fn user_info(&self, access_token: &str) -> Result<Option<UserInfo>, AuthError>;

    /// URL that ends the provider session.
    async fn end_session_url(&self, id_token_hint: Option<&str>) -> Result<Url, AuthError>;
}

/// [`IdentityProvider`] backed by a real OpenID Connect issuer
pub struct OidcProvider {
    http: reqwest::Client,
    config: IdentityConfig,
    metadata: OnceCell<ProviderMetadata>,
}

impl OidcProvider {
    pub fn new(http: reqwest::Client, config: IdentityConfig) -> Self {
        Self {
            http,
            config,
            metadata: OnceCell::new(),
        }
    }

    /// Discovery document URL for an issuer.
    pub fn discovery_url(issuer: &Url) -> String {
        format!(
            "{}/.well-known/openid-configuration",
            issuer.as_str().trim_end_matches('/')
        )
    }

    async fn metadata(&self) -> Result<&ProviderMetadata, AuthError> {
        self.metadata
            .get_or_try_init(|| async {
                let url = Self::discovery_url(&self.config.issuer);
                tracing::debug!("Discovering provider metadata at {}", url);
                let resp = self
                    .http
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| AuthError::Discovery(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(AuthError::Discovery(format!(
                        "{} returned {}",
                        url,
                        resp.status()
                    )));
                }
                resp.json::<ProviderMetadata>()
                    .await
                    .map_err(|e| AuthError::Discovery(e.to_string()))
            })
            .await
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let metadata = self.metadata().await.map_err(|e| e.to_string())?;
        let resp = self
            .http
            .post(metadata.token_endpoint.as_str())
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("{status}: {text}"));
        }

        resp.json::<TokenResponse>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    async fn authorization_url(
        &self,
        code_challenge: &str,
        state: &str,
    ) -> Result<Url, AuthError> {
        let metadata = self.metadata().await?;
        let request = AuthorizationRequest {
            client_id: &self.config.client_id,
            redirect_uri: self.config.redirect_uri.as_str(),
            scope: &self.config.scope,
            code_challenge,
            state,
        };
        let endpoint = parse_endpoint("authorization_endpoint", &metadata.authorization_endpoint)?;
        Ok(build_authorization_url(&endpoint, &request))
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.post_token_form(&[
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ])
        .await
        .map_err(AuthError::TokenExchange)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.post_token_form(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ])
        .await
        .map_err(AuthError::Refresh)
    }

    async fn user_info(&self, access_token: &str) -> Result<Option<UserInfo>, AuthError> {
        let metadata = self.metadata().await?;
        let Some(endpoint) = metadata.userinfo_endpoint.clone() else {
            return Ok(None);
        };
        let resp = self
            .http
            .get(endpoint.as_str())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AuthError::Profile(format!(
                "userinfo returned {}",
                resp.status()
            )));
        }
        let info = resp
            .json::<UserInfo>()
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))?;
        Ok(Some(info))
    }

    async fn end_session_url(&self, id_token_hint: Option<&str>) -> Result<Url, AuthError> {
        let metadata = self.metadata().await?;
        let endpoint = metadata.end_session_endpoint.as_deref().ok_or_else(|| {
            AuthError::Discovery("provider has no end_session_endpoint".to_string())
        })?;
        let mut url = parse_endpoint("end_session_endpoint", endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair(
                "post_logout_redirect_uri",
                self.config.post_logout_redirect_uri.as_str(),
            );
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
        }
        Ok(url)
    }
}
