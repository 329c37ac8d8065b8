use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An Instagram access token together with its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub user_id: Option<String>,
    pub obtained_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_in: Option<i64>) -> Self {
        let obtained_at = Utc::now();
        Self {
            access_token: access_token.into(),
            user_id: None,
            obtained_at,
            expires_at: expires_in.map(|secs| obtained_at + Duration::seconds(secs)),
        }
    }

    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Tokens without a known expiry are treated as valid until the API rejects them.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }

    /// True when the token is still valid but expires within `window`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.expires_at {
            Some(exp) => exp > now && exp - now <= window,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_checks() {
        let now = Utc::now();
        let mut cred = Credential::new("t", Some(3600));
        assert!(!cred.is_expired(now));
        assert!(cred.needs_refresh(now, Duration::days(7)));
        assert!(!cred.needs_refresh(now, Duration::minutes(10)));

        cred.expires_at = Some(now - Duration::seconds(1));
        assert!(cred.is_expired(now));
        assert!(!cred.needs_refresh(now, Duration::days(7)));
    }

    #[test]
    fn test_unknown_expiry_never_expires() {
        let cred = Credential::new("t", None);
        let later = Utc::now() + Duration::days(365);
        assert!(!cred.is_expired(later));
        assert!(!cred.needs_refresh(later, Duration::days(7)));
    }
}
