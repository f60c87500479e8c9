// Access token session
//
// Owns the SHC bearer token. Every REST call asks `ensure_valid` for a
// token; refreshes are single-flight, so a burst of concurrent callers
// produces exactly one token request and all of them observe its result.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, WRONG_CREDENTIAL_CODES, describe_error_code};
use crate::rest::models::TokenResponse;

/// Fixed OAuth client credentials (`clientId:clientPass`) the SHC expects.
const CLIENT_CREDENTIALS: &str = "Basic Y2xpZW50SWQ6Y2xpZW50UGFzcw==";

/// The local SHC API only knows the `admin` user.
const LOGIN_USER: &str = "admin";

/// Lifetime assumed when the token response carries no `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 172_800;

// ── Token ───────────────────────────────────────────────────────────

/// An issued access token.
#[derive(Debug)]
pub struct Token {
    access_token: SecretString,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn secret(&self) -> &SecretString {
        &self.access_token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// `true` if the token expires within `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        let margin = TimeDelta::from_std(margin).unwrap_or(TimeDelta::MAX);
        Utc::now()
            .checked_add_signed(margin)
            .is_none_or(|deadline| deadline >= self.expires_at)
    }
}

// ── SessionConfig ───────────────────────────────────────────────────

/// Refresh policy for the session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Refresh once the token is this close to expiry. Default: 5 min.
    pub refresh_margin: Duration,
    /// Token requests per refresh before the session is invalidated. Default: 3.
    pub refresh_attempts: u32,
    /// Delay before the second attempt, doubled for each further one. Default: 500 ms.
    pub retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(300),
            refresh_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

// ── SessionManager ──────────────────────────────────────────────────

type SharedRefresh = Shared<BoxFuture<'static, Result<Arc<Token>, String>>>;

/// Token lifecycle for one controller.
///
/// Cheaply cloneable; all clones share the same token and in-flight refresh.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    http: reqwest::Client,
    token_url: Url,
    timeout_secs: u64,
    config: SessionConfig,
    state: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    password: Option<SecretString>,
    token: Option<Arc<Token>>,
    inflight: Option<(u64, SharedRefresh)>,
    next_refresh_id: u64,
    /// Set once refresh gave up; cleared by a successful `login`.
    invalidated: Option<String>,
}

impl SessionManager {
    /// Create a session against `{base_url}/auth/token`. Does not log in.
    pub fn new(
        http: reqwest::Client,
        base_url: &Url,
        timeout: Duration,
        config: SessionConfig,
    ) -> Result<Self, Error> {
        let token_url = base_url.join("auth/token")?;
        Ok(Self {
            inner: Arc::new(SessionInner {
                http,
                token_url,
                timeout_secs: timeout.as_secs().max(1),
                config,
                state: Mutex::new(SessionState::default()),
            }),
        })
    }

    /// Authenticate with the controller password.
    ///
    /// Replaces any current token and lifts a previous invalidation. The
    /// password is kept for later refreshes.
    pub async fn login(&self, password: &SecretString) -> Result<Arc<Token>, Error> {
        let token = Arc::new(
            request_token(
                &self.inner.http,
                &self.inner.token_url,
                password,
                self.inner.timeout_secs,
            )
            .await?,
        );

        let mut state = self.inner.lock();
        state.password = Some(password.clone());
        state.token = Some(Arc::clone(&token));
        state.inflight = None;
        state.invalidated = None;
        info!(expires_at = %token.expires_at, "logged in to controller");
        Ok(token)
    }

    /// Forget the token and password locally.
    pub fn logout(&self) {
        let mut state = self.inner.lock();
        let next_refresh_id = state.next_refresh_id;
        *state = SessionState {
            next_refresh_id,
            invalidated: Some("logged out".into()),
            ..SessionState::default()
        };
        debug!("session cleared");
    }

    /// The current token, without refreshing.
    pub fn current_token(&self) -> Option<Arc<Token>> {
        self.inner.lock().token.clone()
    }

    /// `true` unless refresh gave up or the session was never established.
    pub fn is_established(&self) -> bool {
        let state = self.inner.lock();
        state.invalidated.is_none() && state.password.is_some()
    }

    /// Return a token that is not within the refresh margin of expiry,
    /// refreshing first if needed.
    pub async fn ensure_valid(&self) -> Result<Arc<Token>, Error> {
        let refresh = {
            let mut state = self.inner.lock();
            if let Some(reason) = &state.invalidated {
                return Err(Error::SessionExpired {
                    reason: reason.clone(),
                });
            }
            if let Some(token) = &state.token {
                if !token.expires_within(self.inner.config.refresh_margin) {
                    return Ok(Arc::clone(token));
                }
            }
            self.inner.join_or_start(&mut state)?
        };
        self.inner.await_refresh(refresh).await
    }

    /// The controller refused `rejected`; obtain a replacement.
    ///
    /// If another caller already replaced that token, the replacement is
    /// returned without a new request.
    pub async fn refresh_after_rejection(&self, rejected: &Arc<Token>) -> Result<Arc<Token>, Error> {
        let refresh = {
            let mut state = self.inner.lock();
            if let Some(reason) = &state.invalidated {
                return Err(Error::SessionExpired {
                    reason: reason.clone(),
                });
            }
            match &state.token {
                Some(current) if !Arc::ptr_eq(current, rejected) => {
                    return Ok(Arc::clone(current));
                }
                _ => state.token = None,
            }
            self.inner.join_or_start(&mut state)?
        };
        self.inner.await_refresh(refresh).await
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join_or_start(&self, state: &mut SessionState) -> Result<(u64, SharedRefresh), Error> {
        if let Some((id, refresh)) = &state.inflight {
            return Ok((*id, refresh.clone()));
        }

        let password = state.password.clone().ok_or_else(|| Error::SessionExpired {
            reason: "no active session".into(),
        })?;

        let id = state.next_refresh_id;
        state.next_refresh_id += 1;

        let refresh = refresh_with_retry(
            self.http.clone(),
            self.token_url.clone(),
            password,
            self.timeout_secs,
            self.config.clone(),
        )
        .boxed()
        .shared();

        state.inflight = Some((id, refresh.clone()));
        debug!(refresh_id = id, "token refresh started");
        Ok((id, refresh))
    }

    async fn await_refresh(&self, (id, refresh): (u64, SharedRefresh)) -> Result<Arc<Token>, Error> {
        let outcome = refresh.await;

        // First waiter to finish publishes the result; a login in between
        // replaced `inflight`, in which case the outcome is only returned.
        let mut state = self.lock();
        if matches!(state.inflight, Some((current, _)) if current == id) {
            state.inflight = None;
            match &outcome {
                Ok(token) => state.token = Some(Arc::clone(token)),
                Err(reason) => {
                    warn!(%reason, "session invalidated");
                    state.token = None;
                    state.invalidated = Some(reason.clone());
                }
            }
        }
        drop(state);

        outcome.map_err(|reason| Error::SessionExpired { reason })
    }
}

// ── Token requests ──────────────────────────────────────────────────

async fn refresh_with_retry(
    http: reqwest::Client,
    url: Url,
    password: SecretString,
    timeout_secs: u64,
    config: SessionConfig,
) -> Result<Arc<Token>, String> {
    let attempts = config.refresh_attempts.max(1);
    let mut delay = config.retry_delay;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match request_token(&http, &url, &password, timeout_secs).await {
            Ok(token) => {
                debug!(attempt, "token refreshed");
                return Ok(Arc::new(token));
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, attempt, "token refresh failed");
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
            Err(e) => {
                warn!(error = %e, "token refresh rejected");
                return Err(e.to_string());
            }
        }
    }

    Err(format!(
        "token refresh failed after {attempts} attempts: {last_error}"
    ))
}

/// `POST /auth/token` with the password grant.
async fn request_token(
    http: &reqwest::Client,
    url: &Url,
    password: &SecretString,
    timeout_secs: u64,
) -> Result<Token, Error> {
    debug!("requesting access token at {}", url);

    let body = json!({
        "username": LOGIN_USER,
        "password": password.expose_secret(),
        "grant_type": "password",
    });

    let resp = http
        .post(url.clone())
        .header(AUTHORIZATION, CLIENT_CREDENTIALS)
        .header(ACCEPT, "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| Error::from_send(e, timeout_secs))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| Error::from_send(e, timeout_secs))?;

    let parsed: TokenResponse =
        serde_json::from_str(&text).map_err(|e| Error::Deserialization {
            message: format!("token response (HTTP {status}): {e}"),
            body: text.clone(),
        })?;

    if let Some(access_token) = parsed.access_token {
        let issued_at = Utc::now();
        let lifetime = TimeDelta::try_seconds(
            parsed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS),
        )
        .unwrap_or(TimeDelta::zero());
        return Ok(Token {
            access_token: SecretString::from(access_token),
            issued_at,
            expires_at: issued_at + lifetime,
        });
    }

    match parsed.errorcode {
        Some(code) if WRONG_CREDENTIAL_CODES.contains(&code) => Err(Error::WrongCredentials),
        code => Err(Error::Authentication {
            message: parsed
                .description
                .or_else(|| code.and_then(describe_error_code).map(String::from))
                .unwrap_or_else(|| format!("no token received (HTTP {status})")),
        }),
    }
}
