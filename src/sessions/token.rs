use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::{TryRngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::SessionError;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Random bytes at the front of every token.
const ID_LENGTH: usize = 32;

/// HMAC-SHA256 output appended after the random bytes.
const SIGNATURE_LENGTH: usize = 32;

const SIGNED_LENGTH: usize = ID_LENGTH + SIGNATURE_LENGTH;

const STORE_KEY_PREFIX: &str = "sid:";

type HmacSha256 = Hmac<Sha256>;

// -----------------------------------------------------------------------------
// ----- SessionToken ----------------------------------------------------------

/// Opaque session credential: `base64url(random ‖ hmac(key, random))`.
///
/// A token proves that *we* minted it, nothing more. Whatever the session
/// means (who is signed in, since when) lives in the session store under
/// [`SessionToken::store_key`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

// -----------------------------------------------------------------------------
// ----- SessionToken: Static --------------------------------------------------

impl SessionToken {
    /// Mint a new token signed with `signing_key`.
    pub fn create(signing_key: &SecretString) -> Result<Self, SessionError> {
        let mut buf = [0u8; SIGNED_LENGTH];

        OsRng
            .try_fill_bytes(&mut buf[..ID_LENGTH])
            .map_err(|e| SessionError::Entropy(e.to_string()))?;

        let signature = sign(signing_key, &buf[..ID_LENGTH]);
        buf[ID_LENGTH..].copy_from_slice(&signature);

        Ok(Self(URL_SAFE_NO_PAD.encode(buf)))
    }

    /// Check that `raw` was minted with `signing_key`.
    ///
    /// Decoding errors, wrong lengths and signature mismatches all collapse
    /// into `CredentialInvalid`; callers never learn which check failed.
    pub fn validate(raw: &str, signing_key: &SecretString) -> Result<Self, SessionError> {
        let decoded = URL_SAFE_NO_PAD
            .decode(raw.as_bytes())
            .map_err(|_| SessionError::CredentialInvalid)?;

        if decoded.len() != SIGNED_LENGTH {
            return Err(SessionError::CredentialInvalid);
        }

        let (id, signature) = decoded.split_at(ID_LENGTH);
        let expected = sign(signing_key, id);

        if !bool::from(expected[..].ct_eq(signature)) {
            return Err(SessionError::CredentialInvalid);
        }

        Ok(Self(raw.to_string()))
    }
}

// -----------------------------------------------------------------------------
// ----- SessionToken: Public --------------------------------------------------

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the session state is persisted (`sid:<token>`).
    pub fn store_key(&self) -> String {
        format!("{STORE_KEY_PREFIX}{}", self.0)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Tokens are credentials; keep them out of debug logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "SessionToken({prefix}…)")
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn sign(signing_key: &SecretString, payload: &[u8]) -> [u8; SIGNATURE_LENGTH] {
    // HMAC pads or hashes the key to the block size, so no key length is rejected.
    let mut mac = HmacSha256::new_from_slice(signing_key.expose_secret().as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(payload);

    let mut signature = [0u8; SIGNATURE_LENGTH];
    signature.copy_from_slice(&mac.finalize().into_bytes());
    signature
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
