//! Session manager: resolves the current user, drives the redirect login and
//! hands out bearer tokens.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use serde::Deserialize;
use stoop_shared::time::Clock;

use crate::domain::{Profile, Session, UserId};
use crate::error::AuthError;

use super::navigator::Navigator;
use super::pkce::{compute_code_challenge, generate_code_verifier, generate_state};
use super::provider::{IdentityProvider, TokenResponse, UserInfo, decode_id_token_claims};
use super::store::SessionStore;

/// Silent renewal runs this long before the access token expires.
pub const RENEW_LEAD_SECS: i64 = 60;

/// Lifetime assumed when the token response carries no `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 300;

/// Query parameters of the redirect back from the identity provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Extract the parameters from a full callback URL.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        params
    }

    /// A hit without any login parameter (e.g. the post-logout redirect).
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.state.is_none() && self.error.is_none()
    }
}

/// Behaviour switches taken from the identity configuration
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub load_user_info: bool,
    pub automatic_silent_renew: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            load_user_info: true,
            automatic_silent_renew: true,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingLogin {
    code_verifier: String,
    return_to: Option<String>,
}

/// Result of a successful callback
#[derive(Debug, Clone)]
pub struct CompletedLogin {
    pub session: Session,
    /// Location captured when the login started
    pub return_to: Option<String>,
}

/// Owns the session and every interaction with the identity provider
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    options: SessionOptions,
    current: Option<Session>,
    /// Pending logins keyed by `state`
    pending: HashMap<String, PendingLogin>,
    location: Option<String>,
    renewal_suspended: bool,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        options: SessionOptions,
    ) -> Self {
        Self {
            provider,
            store,
            navigator,
            clock,
            options,
            current: None,
            pending: HashMap::new(),
            location: None,
            renewal_suspended: false,
        }
    }

    /// Current session if its credential has not expired.
    ///
    /// Falls back to the session store, so a previous run can be resumed.
    pub fn resolve_session(&mut self) -> Option<&Session> {
        let now = self.clock.now();
        if self.current.as_ref().is_some_and(|s| !s.is_expired(now)) {
            return self.current.as_ref();
        }

        match self.store.load() {
            Ok(Some(session)) if !session.is_expired(now) => {
                tracing::info!("User is logged in: {}", session.profile.username);
                self.current = Some(session);
                self.current.as_ref()
            }
            Ok(_) => {
                tracing::info!("User not logged in or session expired.");
                self.current = None;
                None
            }
            Err(e) => {
                tracing::warn!("Could not read stored session: {}", e);
                self.current = None;
                None
            }
        }
    }

    /// Session as last resolved, expired or not.
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn identity(&self) -> Option<&Profile> {
        self.current.as_ref().map(|s| &s.profile)
    }

    /// Remember where the user is, so a login started now can restore it.
    pub fn set_location(&mut self, location: Option<String>) {
        self.location = location;
    }

    /// Number of logins waiting for their callback.
    pub fn pending_logins(&self) -> usize {
        self.pending.len()
    }

    /// Redirect the user to the provider's authorization endpoint.
    pub async fn start_login(&mut self) -> Result<Url, AuthError> {
        let code_verifier = generate_code_verifier();
        let code_challenge = compute_code_challenge(&code_verifier);
        let state = generate_state();

        let url = self
            .provider
            .authorization_url(&code_challenge, &state)
            .await?;
        // Only the newest redirect can complete.
        self.pending.clear();
        self.pending.insert(
            state,
            PendingLogin {
                code_verifier,
                return_to: self.location.clone(),
            },
        );

        tracing::info!("Starting sign-in redirect");
        self.navigator.navigate(&url);
        Ok(url)
    }

    /// Finish a login from the provider's redirect back.
    pub async fn complete_login_callback(
        &mut self,
        params: CallbackParams,
    ) -> Result<CompletedLogin, AuthError> {
        if let Some(error) = params.error {
            if let Some(state) = params.state.as_deref() {
                self.pending.remove(state);
            }
            return Err(AuthError::Provider {
                error,
                description: params.error_description,
            });
        }

        let state = params
            .state
            .ok_or_else(|| AuthError::StateMismatch("No state in response".to_string()))?;
        let pending = self.pending.remove(&state).ok_or_else(|| {
            AuthError::StateMismatch("No matching state found in storage".to_string())
        })?;
        let code = params.code.ok_or_else(|| {
            AuthError::TokenExchange("No authorization code in response".to_string())
        })?;

        let tokens = self
            .provider
            .exchange_code(&code, &pending.code_verifier)
            .await?;
        let profile = self.load_profile(&tokens).await?;
        let session = session_from_tokens(profile, tokens, None, self.clock.now());

        if let Err(e) = self.store.save(&session) {
            tracing::warn!("Could not persist session: {}", e);
        }
        tracing::info!("Callback successful, user: {}", session.profile.username);

        self.pending.clear();
        self.renewal_suspended = false;
        self.current = Some(session.clone());
        Ok(CompletedLogin {
            session,
            return_to: pending.return_to,
        })
    }

    /// Valid access token, or `None` after starting a login.
    ///
    /// Never waits for the login to finish.
    pub async fn bearer_token(&mut self) -> Option<String> {
        let now = self.clock.now();
        if let Some(session) = self.current.as_ref().filter(|s| !s.is_expired(now)) {
            return Some(session.access_token.clone());
        }

        tracing::warn!("Access token missing or expired. Attempting login.");
        if let Err(e) = self.start_login().await {
            tracing::error!("Could not start login: {}", e);
        }
        None
    }

    /// When the next silent renewal is due, if one is scheduled.
    pub fn renew_due_at(&self) -> Option<DateTime<Utc>> {
        if !self.options.automatic_silent_renew || self.renewal_suspended {
            return None;
        }
        self.current
            .as_ref()
            .filter(|s| s.refresh_token.is_some())
            .map(|s| s.renew_at(Duration::seconds(RENEW_LEAD_SECS)))
    }

    /// Refresh the access token silently.
    ///
    /// A failure suspends renewal until the next login; the session then
    /// simply expires.
    pub async fn renew(&mut self) -> Result<(), AuthError> {
        let Some(session) = self.current.clone() else {
            return Err(AuthError::Refresh("no session".to_string()));
        };
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            self.renewal_suspended = true;
            return Err(AuthError::Refresh("no refresh token".to_string()));
        };

        match self.provider.refresh(refresh_token).await {
            Ok(tokens) => {
                let renewed = session_from_tokens(
                    session.profile.clone(),
                    tokens,
                    Some(&session),
                    self.clock.now(),
                );
                if let Err(e) = self.store.save(&renewed) {
                    tracing::warn!("Could not persist renewed session: {}", e);
                }
                tracing::debug!("Access token renewed until {}", renewed.expires_at);
                self.current = Some(renewed);
                Ok(())
            }
            Err(e) => {
                self.renewal_suspended = true;
                Err(e)
            }
        }
    }

    /// Drop the session and redirect to the provider's logout endpoint.
    ///
    /// Callers close the transport first; see `ChatClient::logout`.
    pub async fn end_session(&mut self) -> Result<Url, AuthError> {
        let id_token_hint = self.current.as_ref().and_then(|s| s.id_token.clone());
        let url = self.provider.end_session_url(id_token_hint.as_deref()).await;

        if let Err(e) = self.store.clear() {
            tracing::warn!("Could not clear stored session: {}", e);
        }
        self.current = None;
        self.pending.clear();
        self.location = None;
        self.renewal_suspended = false;

        let url = url?;
        self.navigator.navigate(&url);
        Ok(url)
    }

    async fn load_profile(&self, tokens: &TokenResponse) -> Result<Profile, AuthError> {
        let info = if self.options.load_user_info {
            self.provider.user_info(&tokens.access_token).await?
        } else {
            None
        };
        let info = match (info, tokens.id_token.as_deref()) {
            (Some(info), _) => info,
            (None, Some(id_token)) => decode_id_token_claims(id_token)?,
            (None, None) => {
                return Err(AuthError::Profile(
                    "no userinfo endpoint and no id token".to_string(),
                ));
            }
        };
        profile_from_claims(info)
    }
}

fn profile_from_claims(info: UserInfo) -> Result<Profile, AuthError> {
    let user_id = UserId::new(info.sub.clone()).map_err(|e| AuthError::Profile(e.to_string()))?;
    let username = info.preferred_username.unwrap_or(info.sub);
    let (first_name, last_name) = match (info.given_name, info.family_name) {
        (None, None) => (info.name, None),
        names => names,
    };
    Ok(Profile {
        user_id,
        username,
        first_name,
        last_name,
    })
}

fn session_from_tokens(
    profile: Profile,
    tokens: TokenResponse,
    previous: Option<&Session>,
    now: DateTime<Utc>,
) -> Session {
    let lifetime = match tokens.expires_in {
        0 => DEFAULT_TOKEN_LIFETIME_SECS,
        secs => i64::try_from(secs).unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS),
    };
    Session {
        profile,
        access_token: tokens.access_token,
        refresh_token: tokens
            .refresh_token
            .or_else(|| previous.and_then(|s| s.refresh_token.clone())),
        id_token: tokens
            .id_token
            .or_else(|| previous.and_then(|s| s.id_token.clone())),
        expires_at: now + Duration::seconds(lifetime),
    }
}
