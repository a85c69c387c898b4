use crate::api::{AccessToken, TokenPair, User, UserId};
use chrono::{DateTime, Utc};
use std::fmt;

/// Authenticated identity plus its credentials
#[derive(Clone)]
pub struct Session {
    pub user_id: UserId,
    pub access_token: AccessToken,
    pub refresh_token: String,
    pub profile: User,
    pub established_at: DateTime<Utc>,
}

impl Session {
    /// Bind a token pair to a freshly fetched profile
    pub fn new(tokens: TokenPair, profile: User) -> Self {
        Self {
            user_id: profile.id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            profile,
            established_at: Utc::now(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &self.access_token)
            .field("refresh_token", &"<redacted>")
            .field("established_at", &self.established_at)
            .finish()
    }
}

/// Observable session state for rendering code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub profile: Option<User>,
    /// A persisted session is being restored
    pub restoring: bool,
}

impl SessionSnapshot {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(profile: User) -> Self {
        Self {
            authenticated: true,
            profile: Some(profile),
            restoring: false,
        }
    }
}

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Established(User),
    SignedOut,
    /// The service denied the credential; the UI should return to login
    Expired { reason: String },
}
