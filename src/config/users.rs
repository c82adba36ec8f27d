use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use secrecy::SecretString;
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::Path,
    sync::Arc,
};
use tokio::fs;
use tracing::error;

use crate::users::{UserRecord, UserStore, UsersError, gravatar_url};

// -----------------------------------------------------------------------------
// ----- Singleton -------------------------------------------------------------

static USERS: OnceCell<UsersConfig> = OnceCell::new();

// -----------------------------------------------------------------------------
// ----- UsersConfig -----------------------------------------------------------

/// Read-only account file. Clones share the same table, so a reload is seen
/// by every holder.
#[derive(Debug, Clone)]
pub struct UsersConfig {
    inner: Arc<RwLock<UsersMap>>,
}

// -----------------------------------------------------------------------------
// ----- UsersConfig: Static ---------------------------------------------------

impl UsersConfig {
    /// Init: panic on any error. Do not continue with a bad state.
    pub async fn init(path: &Path) {
        let cfg = Self::load(path)
            .await
            .unwrap_or_else(|e| panic!("failed to load users config from {:?}: {e}", path));

        USERS
            .set(cfg)
            .unwrap_or_else(|_| panic!("UsersConfig::init called twice"));
    }

    /// Reload: on error, DO NOT swap; keep current map and log.
    pub async fn reload(path: &Path) {
        let new_cfg = match Self::load(path).await {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(
                    "reload failed; keeping previous users config. path={:?} error={}",
                    path, e
                );
                return;
            }
        };

        let new_map = new_cfg.inner.read().clone();
        let current = Self::handle();

        let mut guard = current.inner.write();
        *guard = new_map;
    }

    pub fn handle() -> &'static UsersConfig {
        USERS.get().expect("Users not initialized")
    }
}

// -----------------------------------------------------------------------------
// ----- UsersConfig: Public ---------------------------------------------------

impl UsersConfig {
    pub async fn load(path: &Path) -> Result<UsersConfig, UsersError> {
        let raw = fs::read_to_string(path).await.map_err(|e| UsersError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<UsersConfig, UsersError> {
        let doc: UsersFile = toml::from_str(raw).map_err(|e| UsersError::Toml { source: e })?;

        if doc.users.is_empty() {
            return Err(UsersError::EmptyConfig);
        }

        let mut by_email = HashMap::with_capacity(doc.users.len());
        let mut by_id = HashMap::with_capacity(doc.users.len());

        for user in doc.users {
            validate(&user)?;

            let key = EmailKey::new(&user.email);
            if by_id.insert(user.id, key.clone()).is_some() {
                return Err(UsersError::Duplicate {
                    field: "id",
                    value: user.id.to_string(),
                });
            }

            let photo_url = user
                .photo_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| gravatar_url(&user.email));

            let record = UserRecord {
                id: user.id,
                email: user.email.trim().to_string(),
                password_hash: SecretString::new(user.password_hash.into_boxed_str()),
                user_name: user.user_name,
                first_name: user.first_name,
                last_name: user.last_name,
                photo_url,
            };

            if by_email.insert(key, record).is_some() {
                return Err(UsersError::Duplicate {
                    field: "email",
                    value: user.email,
                });
            }
        }

        Ok(UsersConfig {
            inner: Arc::new(RwLock::new(UsersMap { by_email, by_id })),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_email.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for UsersConfig {
    async fn get_by_email(&self, email: &str) -> Result<UserRecord, UsersError> {
        let guard = self.inner.read();
        guard
            .by_email
            .get(&EmailKey::new(email))
            .cloned()
            .ok_or_else(|| UsersError::UnknownUser {
                email: email.to_string(),
            })
    }

    async fn get_by_id(&self, id: i64) -> Result<UserRecord, UsersError> {
        let guard = self.inner.read();
        guard
            .by_id
            .get(&id)
            .and_then(|key| guard.by_email.get(key))
            .cloned()
            .ok_or(UsersError::UnknownId { id })
    }

    fn decoy_hash(&self) -> Option<SecretString> {
        let guard = self.inner.read();
        guard
            .by_email
            .values()
            .next()
            .map(|record| record.password_hash.clone())
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: map/key -----------------------------------------------------

#[derive(Debug, Clone, Default)]
struct UsersMap {
    by_email: HashMap<EmailKey, UserRecord>,
    by_id: HashMap<i64, EmailKey>,
}

/// Emails compare trimmed and case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EmailKey(String);

impl EmailKey {
    fn new(email: &str) -> Self {
        Self(email.trim().to_lowercase())
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UsersFileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct UsersFileEntry {
    id: i64,
    email: String,

    #[serde(alias = "pass_hash")]
    password_hash: String,

    #[serde(alias = "username")]
    user_name: String,

    #[serde(default)]
    first_name: String,

    #[serde(default)]
    last_name: String,

    #[serde(default)]
    photo_url: Option<String>,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn validate(u: &UsersFileEntry) -> Result<(), UsersError> {
    if u.email.trim().is_empty() || !u.email.contains('@') {
        return Err(UsersError::InvalidField("email".into()));
    }
    if u.password_hash.is_empty() {
        return Err(UsersError::InvalidField("password_hash".into()));
    }
    if u.user_name.trim().is_empty() {
        return Err(UsersError::InvalidField("user_name".into()));
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
