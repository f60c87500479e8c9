use thiserror::Error;

/// Top-level error type for the `livisi-api` crate.
///
/// Covers every failure mode of the SHC surfaces: token handling,
/// transport, the `{errorcode, description}` envelope, and the event socket.
/// `livisi-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The controller rejected the password (error codes 2003 / 2009).
    #[error("The user credentials are wrong")]
    WrongCredentials,

    /// Token request failed for a reason other than bad credentials.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The controller refused the bearer token of a request.
    #[error("Access token rejected by controller (error code {code:?})")]
    TokenRejected { code: Option<u32> },

    /// Token refresh gave up; the session must be re-established with `login`.
    #[error("Session expired -- re-authentication required: {reason}")]
    SessionExpired { reason: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error that is neither a timeout nor a connect failure.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The controller could not be reached at all.
    #[error("Unable to connect to the Smart Home Controller at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Controller ──────────────────────────────────────────────────
    /// Error envelope returned by the controller: `{"errorcode": n, "description": ...}`.
    #[error("Controller error {code}: {message}")]
    Shc { code: u32, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the token is no longer accepted and a refresh
    /// or a fresh login might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::TokenRejected { .. } | Self::SessionExpired { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. }
            | Self::Unreachable { .. }
            | Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. } => true,
            Self::Shc { code, .. } => matches!(code, 1001 | 1002 | 1006 | 5002),
            _ => false,
        }
    }

    /// The controller's numeric error code, if this error carries one.
    pub fn shc_error_code(&self) -> Option<u32> {
        match self {
            Self::Shc { code, .. } => Some(*code),
            Self::TokenRejected { code } => *code,
            _ => None,
        }
    }

    /// Map a reqwest failure onto the timeout / unreachable variants.
    pub(crate) fn from_send(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs }
        } else if err.is_connect() {
            Self::Unreachable {
                url: err
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string),
                reason: err.to_string(),
            }
        } else {
            Self::Transport(err)
        }
    }
}

// ── Controller error codes ──────────────────────────────────────────

/// Error codes that mean the bearer token is no longer usable.
pub(crate) const TOKEN_ERROR_CODES: [u32; 3] = [2004, 2007, 2012];

/// Error codes returned by the token endpoint for a bad password.
pub(crate) const WRONG_CREDENTIAL_CODES: [u32; 2] = [2003, 2009];

/// Documented description for a controller error code.
pub fn describe_error_code(code: u32) -> Option<&'static str> {
    let text = match code {
        // General
        1000 => "An unknown error has occurred.",
        1001 => "Service unavailable.",
        1002 => "Service timeout.",
        1003 => "Internal API error.",
        1004 => "SHC invalid operation.",
        1005 => "Missing argument or wrong value.",
        1006 => "Service too busy.",
        1007 => "Unsupported request.",
        1008 => "Precondition failed.",
        // Authentication and authorization
        2000 => "An unknown error has occurred during Authentication or Authorization process.",
        2001 => "Access not allowed.",
        2002 => "Invalid token request.",
        2003 => "Invalid client credentials.",
        2004 => "The token signature is invalid.",
        2005 => "Failed to initialize user session.",
        2006 => "A connection already exists for the current session.",
        2007 => "The lifetime of the token has expired.",
        2008 => "Login attempted from a different client provider.",
        2009 => "Invalid user credentials.",
        2010 => "Controller access not allowed.",
        2011 => "Insufficient permissions.",
        2012 => "Session not found.",
        2013 => "Account temporary locked.",
        // Entities
        3000 => "The requested entity does not exist.",
        3001 => "The provided request content is invalid and can't be parsed.",
        3002 => "No change performed.",
        3003 => "The provided entity already exists.",
        3004 => "The provided interaction is not valid.",
        3005 => "Too many entities of this type.",
        // Products
        3500 => "Premium Services can't be directly enabled.",
        3501 => "Cannot remove a product that was paid.",
        // Actions
        4000 => "The triggered action is invalid.",
        4001 => "Invalid parameter.",
        4002 => "Permission to trigger action not allowed.",
        4003 => "Unsupported action type.",
        // Configuration
        5000 => "The configuration could not be updated.",
        5001 => "Could not obtain exclusive access on the configuration.",
        5002 => "Communication with the SHC failed.",
        5003 => "The owner did not accept the TaC latest version.",
        5004 => "One SHC already registered.",
        5005 => "The user has no SHC.",
        5006 => "Controller offline.",
        5009 => "Registration failure.",
        // SmartCodes
        6000 => "SmartCode request not allowed.",
        6001 => "The SmartCode cannot be redeemed.",
        6002 => "Restricted access.",
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_codes_are_auth_expired() {
        for code in TOKEN_ERROR_CODES {
            let err = Error::TokenRejected { code: Some(code) };
            assert!(err.is_auth_expired());
            assert_eq!(err.shc_error_code(), Some(code));
        }
    }

    #[test]
    fn busy_controller_is_transient() {
        let busy = Error::Shc {
            code: 1006,
            message: "Service too busy.".into(),
        };
        let invalid = Error::Shc {
            code: 4001,
            message: "Invalid parameter.".into(),
        };
        assert!(busy.is_transient());
        assert!(!invalid.is_transient());
        assert!(!Error::WrongCredentials.is_transient());
    }

    #[test]
    fn known_and_unknown_codes() {
        assert_eq!(
            describe_error_code(2007),
            Some("The lifetime of the token has expired.")
        );
        assert_eq!(describe_error_code(4242), None);
    }
}
