//! Meeting provider API types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request body for creating a meeting.
#[derive(Debug, Clone, Serialize)]
pub struct CreateMeetingRequest {
    /// Meeting topic shown to participants.
    pub topic: String,

    /// Scheduled start time.
    pub start_time: DateTime<Utc>,

    /// Duration in minutes.
    pub duration: i32,

    /// IANA timezone for the invitation.
    pub timezone: String,
}

/// A provisioned meeting resource.
#[derive(Debug, Clone, Deserialize)]
pub struct Meeting {
    /// Provider-assigned meeting id.
    #[serde(deserialize_with = "meeting_id_as_string")]
    pub id: String,

    /// Join URL for participants.
    pub join_url: String,

    /// Meeting password, if the provider issued one.
    #[serde(default)]
    pub password: Option<String>,
}

/// The provider returns numeric meeting ids; older API versions used strings.
fn meeting_id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(u64),
        Str(String),
    }

    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Num(n) => n.to_string(),
        IdRepr::Str(s) => s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meeting_id_accepts_numeric_and_string() {
        let m: Meeting =
            serde_json::from_str(r#"{"id": 987654321, "join_url": "https://x/j/1"}"#).unwrap();
        assert_eq!(m.id, "987654321");
        assert!(m.password.is_none());

        let m: Meeting = serde_json::from_str(
            r#"{"id": "987654321", "join_url": "https://x/j/1", "password": "s3cret"}"#,
        )
        .unwrap();
        assert_eq!(m.id, "987654321");
        assert_eq!(m.password.as_deref(), Some("s3cret"));
    }
}
