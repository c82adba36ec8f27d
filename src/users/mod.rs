//! Account model and the account-store seam.
//!
//! Account persistence is not this crate's job. The gateway only needs to
//! look an account up by email or id and check a password, so that is all
//! [`UserStore`] exposes. The file-backed implementation lives in
//! `config::users`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const GRAVATAR_BASE_URL: &str = "https://www.gravatar.com/avatar/";

// -----------------------------------------------------------------------------
// ----- UserStore -------------------------------------------------------------

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_email(&self, email: &str) -> Result<UserRecord, UsersError>;

    async fn get_by_id(&self, id: i64) -> Result<UserRecord, UsersError>;

    /// A stored hash to burn a verification against when the account does
    /// not exist, so both sign-in failures cost the same.
    fn decoy_hash(&self) -> Option<SecretString> {
        None
    }
}

// -----------------------------------------------------------------------------
// ----- UserProfile -----------------------------------------------------------

/// The public face of an account. This is what gets stored in session state,
/// returned from sign-in and forwarded to backends in `X-User`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,

    #[serde(rename = "userName")]
    pub user_name: String,

    #[serde(rename = "firstName")]
    pub first_name: String,

    #[serde(rename = "lastName")]
    pub last_name: String,

    #[serde(rename = "photoURL")]
    pub photo_url: String,
}

// -----------------------------------------------------------------------------
// ----- UserRecord ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: SecretString,
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub photo_url: String,
}

impl UserRecord {
    /// Verify `password` against the stored bcrypt hash.
    ///
    /// bcrypt is deliberately slow; call this from a blocking context.
    pub fn authenticate(&self, password: &str) -> Result<(), UsersError> {
        match bcrypt::verify(password, self.password_hash.expose_secret()) {
            Ok(true) => Ok(()),
            Ok(false) => Err(UsersError::BadPassword),
            Err(e) => Err(UsersError::Hash(e.to_string())),
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            user_name: self.user_name.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            photo_url: self.photo_url.clone(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Credentials -----------------------------------------------------------

/// Sign-in request body.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

/// Run one bcrypt verification whose outcome is ignored, so a sign-in for an
/// unknown account costs what a wrong password costs. Blocking, like
/// [`UserRecord::authenticate`].
pub fn decoy_password_check(password: &str, hash: &SecretString) {
    let _ = bcrypt::verify(password, hash.expose_secret());
}

/// Gravatar URL for `email` (md5 of the trimmed, lower-cased address).
pub fn gravatar_url(email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    let digest = md5::compute(normalized.as_bytes());
    format!("{GRAVATAR_BASE_URL}{digest:x}")
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum UsersError {
    #[error("accounts file is empty")]
    EmptyConfig,

    #[error("duplicate [[users]] entry for {field} '{value}'")]
    Duplicate { field: &'static str, value: String },

    #[error("unknown account '{email}'")]
    UnknownUser { email: String },

    #[error("no account with id {id}")]
    UnknownId { id: i64 },

    #[error("invalid or missing field '{0}'")]
    InvalidField(String),

    #[error("bad password")]
    BadPassword,

    #[error("password hash error: {0}")]
    Hash(String),

    #[error("read error for {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
