use std::sync::Arc;

use axum::extract::Query;
use axum::http::{HeaderMap, HeaderValue, Uri, header::AUTHORIZATION};
use bytes::Bytes;
use secrecy::SecretString;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use super::{SessionError, SessionStore, SessionToken};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const SCHEME_BEARER: &str = "Bearer ";

// -----------------------------------------------------------------------------
// ----- SessionManager --------------------------------------------------------

/// Begins, reads, refreshes and ends sessions.
///
/// Cheap to clone; every clone shares the signing key and the store.
#[derive(Clone)]
pub struct SessionManager {
    signing_key: Arc<SecretString>,
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(signing_key: SecretString, store: Arc<dyn SessionStore>) -> Self {
        Self {
            signing_key: Arc::new(signing_key),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }
}

// -----------------------------------------------------------------------------
// ----- SessionManager: Public ------------------------------------------------

impl SessionManager {
    /// Mint a token, persist `state` under it, then write
    /// `Authorization: Bearer <token>` into `response_headers`.
    ///
    /// No rollback: if persisting fails the header is never written.
    pub async fn begin_session<T: Serialize>(
        &self,
        state: &T,
        response_headers: &mut HeaderMap,
    ) -> Result<SessionToken, SessionError> {
        let token = SessionToken::create(&self.signing_key)?;

        self.save_state(&token, state).await?;

        let value = HeaderValue::from_str(&format!("{SCHEME_BEARER}{token}"))
            .map_err(|_| SessionError::CredentialInvalid)?;
        response_headers.insert(AUTHORIZATION, value);

        Ok(token)
    }

    /// Overwrite the state stored for an existing token.
    pub async fn save_state<T: Serialize>(
        &self,
        token: &SessionToken,
        state: &T,
    ) -> Result<(), SessionError> {
        let encoded = serde_json::to_vec(state)?;
        self.store.save(token, Bytes::from(encoded)).await
    }

    /// Extract and validate the caller's token. Never touches the store.
    pub fn session_token(&self, headers: &HeaderMap, uri: &Uri) -> Result<SessionToken, SessionError> {
        let raw = extract_token(headers, uri)?;
        SessionToken::validate(&raw, &self.signing_key)
    }

    /// Resolve the caller's session state.
    ///
    /// The first failing step wins: extraction, signature validation, then
    /// the store lookup.
    pub async fn load_state<T: DeserializeOwned>(
        &self,
        headers: &HeaderMap,
        uri: &Uri,
    ) -> Result<(SessionToken, T), SessionError> {
        let token = self.session_token(headers, uri)?;
        let raw = self.store.get(&token).await?;
        let state = serde_json::from_slice(&raw)?;

        Ok((token, state))
    }

    /// Validate the caller's token and drop its state.
    pub async fn end_session(&self, headers: &HeaderMap, uri: &Uri) -> Result<SessionToken, SessionError> {
        let token = self.session_token(headers, uri)?;
        self.store.delete(&token).await?;

        debug!(?token, "session ended");
        Ok(token)
    }
}

// -----------------------------------------------------------------------------
// ----- Credential extraction -------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct AuthQuery {
    auth: Option<String>,
}

/// Pull the raw token out of `Authorization`, falling back to `?auth=`.
///
/// Both carry the scheme-prefixed value (`Bearer <token>`). A credential
/// without that exact prefix is invalid rather than silently sliced.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Result<String, SessionError> {
    let header = headers
        .get(AUTHORIZATION)
        .map(|v| v.to_str().map_err(|_| SessionError::CredentialInvalid))
        .transpose()?
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let credential = match header {
        Some(value) => value,
        None => Query::<AuthQuery>::try_from_uri(uri)
            .ok()
            .and_then(|Query(q)| q.auth)
            .filter(|v| !v.is_empty())
            .ok_or(SessionError::CredentialMissing)?,
    };

    let Some(token) = credential.strip_prefix(SCHEME_BEARER) else {
        debug!("credential without {:?} scheme prefix", SCHEME_BEARER.trim_end());
        return Err(SessionError::CredentialInvalid);
    };

    Ok(token.to_string())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
