use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime of every issued credential.
pub const CREDENTIAL_TTL_HOURS: i64 = 6;

const DEFAULT_IDENTITY_PREFIX: &str = "user_";
const PRIVATE_ROOM_PREFIX: &str = "alex-private-";
const NOMINAL_ROOM_PREFIX: &str = "alex-room-";

/// Optional identity/room pair as it arrives from a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialRequest {
    pub identity: Option<String>,
    pub room: Option<String>,
}

impl CredentialRequest {
    pub fn new(identity: Option<String>, room: Option<String>) -> Self {
        Self {
            identity: non_empty(identity),
            room: non_empty(room),
        }
    }

    /// Fills in the defaults: `user_<millis>` for the identity and
    /// `alex-private-<identity>` for the room. Supplied values are kept as-is.
    pub fn resolve(&self, now: DateTime<Utc>) -> (String, String) {
        let identity = self
            .identity
            .clone()
            .unwrap_or_else(|| format!("{}{}", DEFAULT_IDENTITY_PREFIX, now.timestamp_millis()));
        let room = self
            .room
            .clone()
            .unwrap_or_else(|| format!("{}{}", PRIVATE_ROOM_PREFIX, identity));
        (identity, room)
    }
}

/// A signed, time-limited grant to join one room as one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub subject_identity: String,
    pub room_name: String,
    pub signed_token: String,
    pub server_endpoint: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        subject_identity: String,
        room_name: String,
        signed_token: String,
        server_endpoint: String,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject_identity,
            room_name,
            signed_token,
            server_endpoint,
            issued_at,
            expires_at: issued_at + Duration::hours(CREDENTIAL_TTL_HOURS),
        }
    }

    pub fn ttl() -> std::time::Duration {
        std::time::Duration::from_secs(CREDENTIAL_TTL_HOURS as u64 * 3600)
    }
}

/// Room name used by the create-room endpoint when none is supplied.
pub fn nominal_room_name(room: Option<String>, now: DateTime<Utc>) -> String {
    non_empty(room).unwrap_or_else(|| format!("{}{}", NOMINAL_ROOM_PREFIX, now.timestamp_millis()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_derive_room_from_identity() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let (identity, room) = CredentialRequest::default().resolve(now);

        assert_eq!(identity, "user_1700000000123");
        assert_eq!(room, "alex-private-user_1700000000123");
    }

    #[test]
    fn supplied_values_are_echoed() {
        let now = Utc::now();
        let request = CredentialRequest::new(Some("Dana O'Neil".into()), Some("room/α 1".into()));
        let (identity, room) = request.resolve(now);

        assert_eq!(identity, "Dana O'Neil");
        assert_eq!(room, "room/α 1");
    }

    #[test]
    fn empty_values_count_as_absent() {
        let now = Utc.timestamp_millis_opt(42).unwrap();
        let request = CredentialRequest::new(Some(String::new()), Some("lobby".into()));
        let (identity, room) = request.resolve(now);

        assert_eq!(identity, "user_42");
        assert_eq!(room, "lobby");
    }

    #[test]
    fn distinct_millis_give_distinct_defaults() {
        let first = Utc.timestamp_millis_opt(1_000).unwrap();
        let second = Utc.timestamp_millis_opt(1_001).unwrap();

        let a = CredentialRequest::default().resolve(first);
        let b = CredentialRequest::default().resolve(second);

        assert_ne!(a.0, b.0);
        assert_ne!(a.1, b.1);
    }

    #[test]
    fn expiry_is_six_hours_after_issue() {
        let issued = Utc::now();
        let credential = Credential::new(
            "u".into(),
            "r".into(),
            "t".into(),
            "wss://media.example.com".into(),
            issued,
        );
        assert_eq!(credential.expires_at - credential.issued_at, Duration::hours(6));
        assert_eq!(Credential::ttl().as_secs(), 6 * 3600);
    }

    #[test]
    fn nominal_room_defaults_to_timestamp() {
        let now = Utc.timestamp_millis_opt(5).unwrap();
        assert_eq!(nominal_room_name(None, now), "alex-room-5");
        assert_eq!(nominal_room_name(Some("x".into()), now), "x");
    }
}
