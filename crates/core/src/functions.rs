use chrono::{DateTime, Duration, Utc};
use rand::{distr::Alphanumeric, Rng};

use crate::types::SessionId;

/// Generate a cryptographically random session ID.
pub fn generate_session_id() -> SessionId {
    let id: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    SessionId::new(id)
}

/// Check whether an expiry timestamp has passed.
///
/// A session is expired iff its expiry is strictly earlier than `now`.
pub fn is_session_expired(expires_on: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_on < now
}

/// Calculate session expiry from creation time and TTL.
pub fn calculate_expiry(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    created_at + ttl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_session_id_produces_32_char_alphanumeric() {
        let id = generate_session_id();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generate_session_id_is_unique() {
        let id1 = generate_session_id();
        let id2 = generate_session_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn is_session_expired_returns_false_for_future_expiry() {
        let now = Utc::now();
        assert!(!is_session_expired(now + Duration::hours(1), now));
    }

    #[test]
    fn is_session_expired_returns_true_for_past_expiry() {
        let now = Utc::now();
        assert!(is_session_expired(now - Duration::hours(1), now));
    }

    #[test]
    fn is_session_expired_returns_false_at_exact_expiry() {
        let now = Utc::now();
        assert!(!is_session_expired(now, now));
    }

    #[test]
    fn calculate_expiry_adds_ttl_to_created_at() {
        let created = Utc::now();
        let ttl = Duration::days(7);
        assert_eq!(calculate_expiry(created, ttl), created + ttl);
    }
}
