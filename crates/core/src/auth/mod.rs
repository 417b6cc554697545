pub mod idle;
pub mod supabase;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Refresh this long before the upstream token runs out.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// An authenticated user session. Passed explicitly to whatever needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) >= self.expires_at
    }
}

#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<Session>;

    /// Exchange the session's refresh token for a new upstream token.
    /// A refusal is reported as [`AuthRejected`].
    async fn refresh(&self, session: &Session) -> anyhow::Result<Session>;

    async fn sign_out(&self, session: &Session) -> anyhow::Result<()>;
}

/// The auth service refused the credentials or token.
#[derive(Debug, Clone)]
pub struct AuthRejected {
    pub status: u16,
    pub message: String,
}

impl fmt::Display for AuthRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "auth rejected (status={}): {}", self.status, self.message)
    }
}

impl std::error::Error for AuthRejected {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn refresh_is_due_shortly_before_expiry() {
        let expires_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let session = Session {
            user_id: Uuid::new_v4(),
            email: None,
            access_token: "jwt".to_string(),
            refresh_token: Some("r1".to_string()),
            expires_at,
        };
        assert!(!session.needs_refresh(expires_at - Duration::minutes(5)));
        assert!(session.needs_refresh(expires_at - Duration::seconds(30)));
        assert!(!session.is_expired(expires_at - Duration::seconds(30)));
        assert!(session.needs_refresh(expires_at));
    }
}
