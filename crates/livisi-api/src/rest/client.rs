// SHC REST client
//
// Wraps `reqwest::Client` with bearer-token injection, the controller's
// `{errorcode, description}` envelope, and the one-shot refresh-and-retry
// when a token is refused. Endpoint methods live in sibling modules as
// inherent impls to keep this module focused on transport mechanics.

use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{Error, TOKEN_ERROR_CODES, describe_error_code};
use crate::rest::models::ErrorEnvelope;
use crate::session::{SessionConfig, SessionManager, Token};
use crate::transport::TransportConfig;

/// HTTP client for the SHC's local REST API (`http://{host}:8080/`).
///
/// All methods return decoded payloads; error envelopes are turned into
/// [`Error`] before the caller sees them.
pub struct ShcClient {
    http: reqwest::Client,
    base_url: Url,
    session: SessionManager,
    timeout_secs: u64,
}

impl ShcClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the controller root, e.g. `http://192.168.1.20:8080`.
    pub fn new(
        base_url: Url,
        transport: &TransportConfig,
        session: SessionConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(http, base_url, transport, session)
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        transport: &TransportConfig,
        session: SessionConfig,
    ) -> Result<Self, Error> {
        let base_url = normalize_base(base_url);
        let session = SessionManager::new(http.clone(), &base_url, transport.timeout, session)?;
        Ok(Self {
            http,
            base_url,
            session,
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// The controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The token session backing this client.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Log in with the controller password.
    pub async fn login(&self, password: &SecretString) -> Result<(), Error> {
        self.session.login(password).await.map(|_| ())
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/{path}`
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and decode the body.
    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.request(Method::GET, path, None::<&()>).await
    }

    /// Send a POST request with JSON body and decode the response.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Authorized request with one refresh-and-retry on a refused token.
    async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, Error> {
        let url = self.api_url(path)?;
        let token = self.session.ensure_valid().await?;

        match self.send_once(method.clone(), &url, body, &token).await {
            Err(Error::TokenRejected { code }) => {
                debug!(?code, "token rejected, refreshing and retrying {}", url);
                let fresh = self.session.refresh_after_rejection(&token).await?;
                self.send_once(method, &url, body, &fresh)
                    .await
                    .map_err(|e| match e {
                        Error::TokenRejected { code } => Error::Authentication {
                            message: format!(
                                "token refused again after refresh (error code {})",
                                code.map_or_else(|| "-".into(), |c| c.to_string())
                            ),
                        },
                        other => other,
                    })
            }
            other => other,
        }
    }

    async fn send_once<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&B>,
        token: &Token,
    ) -> Result<T, Error> {
        debug!("{} {}", method, url);

        let mut req = self
            .http
            .request(method, url.clone())
            .header(AUTHORIZATION, bearer(token.secret()))
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout_secs))?;

        self.parse_response(resp).await
    }

    /// Decode the body, turning `401` and the error envelope into errors.
    async fn parse_response<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::from_send(e, self.timeout_secs))?;

        let envelope = serde_json::from_str::<ErrorEnvelope>(&body).ok();

        if let Some(ErrorEnvelope { errorcode, description }) = envelope {
            if TOKEN_ERROR_CODES.contains(&errorcode) {
                return Err(Error::TokenRejected {
                    code: Some(errorcode),
                });
            }
            return Err(Error::Shc {
                code: errorcode,
                message: description
                    .or_else(|| describe_error_code(errorcode).map(String::from))
                    .unwrap_or_else(|| format!("unknown error code {errorcode}")),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::TokenRejected { code: None });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("HTTP {status}: {e}"),
            body,
        })
    }
}

fn bearer(secret: &SecretString) -> String {
    format!("Bearer {}", secret.expose_secret())
}

/// Ensure the base URL ends with `/` so `join` appends instead of replacing.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let url = normalize_base(Url::parse("http://192.168.1.20:8080").unwrap());
        assert_eq!(url.as_str(), "http://192.168.1.20:8080/");

        let url = normalize_base(Url::parse("http://shc.local:8080/api").unwrap());
        assert_eq!(url.join("device").unwrap().as_str(), "http://shc.local:8080/api/device");
    }
}
