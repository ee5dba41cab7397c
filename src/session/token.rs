use std::fmt;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Opaque session credential plus the moment it stops being valid.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    value: String,
    #[serde(default)]
    expires_at: Option<Timestamp>,
}

impl SessionToken {
    /// A token with no known expiry.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(value: impl Into<String>, expires_at: Timestamp) -> Self {
        Self {
            value: value.into(),
            expires_at: Some(expires_at),
        }
    }

    /// Builds a token that expires `ttl` from now, as refresh endpoints report it.
    pub fn expiring_in(value: impl Into<String>, ttl: Duration) -> Result<Self, Error> {
        let ttl = SignedDuration::try_from(ttl)
            .map_err(|e| Error::Config(format!("Token TTL out of range: {}", e)))?;
        let expires_at = Timestamp::now()
            .checked_add(ttl)
            .map_err(|e| Error::Config(format!("Token expiry overflow: {}", e)))?;
        Ok(Self::with_expiry(value, expires_at))
    }

    /// Returns the raw token value suitable for Authorization headers.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

// Token values never reach logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
