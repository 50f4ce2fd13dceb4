/* 📖 # Why a CredentialVerifier trait for a single static key?

The refresh route only needs "is this bearer token acceptable". Routing asks the
verifier and nothing else, so replacing the static key with something else later is
a new impl of the trait, not a change to the routes.
*/

use typereg_base::pal::http::HttpHeaders;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
const BEARER_SCHEME: &str = "bearer";

/// Decides whether a presented bearer token is acceptable.
pub trait CredentialVerifier: std::fmt::Debug + Send + Sync {
    fn verify(&self, token: &str) -> bool;
}

/// Accepts exactly one configured key.
#[derive(Clone)]
pub struct StaticApiKey {
    key: String,
}

impl StaticApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl std::fmt::Debug for StaticApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticApiKey")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl CredentialVerifier for StaticApiKey {
    fn verify(&self, token: &str) -> bool {
        !self.key.is_empty() && token == self.key
    }
}

/// Why a request was not authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization: Bearer ...` header.
    MissingCredential,
    /// A bearer token the verifier rejected.
    InvalidCredential,
}

impl AuthError {
    /// Message sent to the client. Both cases look the same from outside.
    pub fn detail(&self) -> &'static str {
        "Forbidden"
    }
}

/// The token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HttpHeaders) -> Option<&str> {
    let value = headers.get(AUTHORIZATION_HEADER)?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Check the request headers against `verifier`.
pub fn authorize(verifier: &dyn CredentialVerifier, headers: &HttpHeaders) -> Result<(), AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::MissingCredential)?;
    if verifier.verify(token) {
        Ok(())
    } else {
        Err(AuthError::InvalidCredential)
    }
}
