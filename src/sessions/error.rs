use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- SessionError ----------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no session credential in Authorization header or auth query parameter")]
    CredentialMissing,

    #[error("invalid session credential")]
    CredentialInvalid,

    #[error("session state not found")]
    StateNotFound,

    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("entropy source failure: {0}")]
    Entropy(String),

    #[error("session state (de)serialization failed: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl SessionError {
    /// Errors caused by what the caller sent, as opposed to our own plumbing.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            SessionError::CredentialMissing
                | SessionError::CredentialInvalid
                | SessionError::StateNotFound
        )
    }
}

impl From<redis::RedisError> for SessionError {
    fn from(err: redis::RedisError) -> Self {
        SessionError::StoreUnavailable(err.to_string())
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
