use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::users::UserProfile;

// -----------------------------------------------------------------------------
// ----- SessionState ----------------------------------------------------------

/// What the gateway keeps per signed-in session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub time: DateTime<Utc>,
    pub user: UserProfile,
}

impl SessionState {
    pub fn new(user: UserProfile) -> Self {
        Self {
            time: Utc::now(),
            user,
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
