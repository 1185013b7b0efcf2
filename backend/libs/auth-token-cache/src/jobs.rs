//! User state jobs and their queue wire format
//!
//! A job travels as a [`JobEnvelope`]:
//!
//! ```json
//! {"id": "...", "name": "USER_INVALIDATE_TOKENS", "data": {"userId": "42"}, "enqueuedAt": "..."}
//! ```
//!
//! The name stays a plain string on the wire so that a worker can drop
//! kinds it does not know instead of failing to deserialize the envelope.

use crate::error::JobDecodeError;
use crate::models::UserSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Default queue name for user state propagation
pub const USER_STATE_QUEUE: &str = "user-state";

pub const SNAPSHOT_UPDATED: &str = "USER_SNAPSHOT_UPDATED";
pub const INVALIDATE_TOKENS: &str = "USER_INVALIDATE_TOKENS";

/// Work item for the state propagation worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserStateJob {
    /// Push the snapshot into every cached token of its user
    SnapshotUpdated { snapshot: UserSnapshot },
    /// Revoke every cached token of the user
    InvalidateTokens { user_id: String },
}

impl UserStateJob {
    pub fn name(&self) -> &'static str {
        match self {
            UserStateJob::SnapshotUpdated { .. } => SNAPSHOT_UPDATED,
            UserStateJob::InvalidateTokens { .. } => INVALIDATE_TOKENS,
        }
    }

    /// User whose tokens the job touches
    pub fn user_id(&self) -> &str {
        match self {
            UserStateJob::SnapshotUpdated { snapshot } => &snapshot.id,
            UserStateJob::InvalidateTokens { user_id } => user_id,
        }
    }

    fn data(&self) -> serde_json::Value {
        match self {
            UserStateJob::SnapshotUpdated { snapshot } => json!({ "snapshot": snapshot }),
            UserStateJob::InvalidateTokens { user_id } => json!({ "userId": user_id }),
        }
    }
}

/// Serialized form of a job on the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl JobEnvelope {
    pub fn new(job: &UserStateJob) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: job.name().to_string(),
            data: job.data(),
            enqueued_at: Some(Utc::now()),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, JobDecodeError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Interpret the payload according to the job name
    pub fn to_job(&self) -> Result<UserStateJob, JobDecodeError> {
        match self.name.as_str() {
            SNAPSHOT_UPDATED => {
                let snapshot = match self.data.get("snapshot") {
                    None | Some(serde_json::Value::Null) => {
                        return Err(JobDecodeError::MissingSnapshot)
                    }
                    Some(value) => UserSnapshot::deserialize(value)?,
                };
                if snapshot.id.is_empty() {
                    return Err(JobDecodeError::MissingSnapshot);
                }
                Ok(UserStateJob::SnapshotUpdated { snapshot })
            }
            INVALIDATE_TOKENS => {
                let user_id = self
                    .data
                    .get("userId")
                    .and_then(|v| v.as_str())
                    .filter(|id| !id.is_empty())
                    .ok_or(JobDecodeError::MissingUserId)?;
                Ok(UserStateJob::InvalidateTokens {
                    user_id: user_id.to_string(),
                })
            }
            other => Err(JobDecodeError::UnknownKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn snapshot() -> UserSnapshot {
        UserSnapshot {
            id: "u1".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            role: UserRole::Admin,
            bio: "bio".into(),
            profile_image: String::new(),
            followers_count: 1,
            following_count: 2,
        }
    }

    #[test]
    fn test_invalidate_envelope_wire_format() {
        let job = UserStateJob::InvalidateTokens {
            user_id: "u1".into(),
        };
        let envelope = JobEnvelope::new(&job);
        let json: serde_json::Value =
            serde_json::from_str(&envelope.encode().unwrap()).unwrap();

        assert_eq!(json["name"], "USER_INVALIDATE_TOKENS");
        assert_eq!(json["data"]["userId"], "u1");
        assert!(json["enqueuedAt"].is_string());
    }

    #[test]
    fn test_snapshot_envelope_decodes_back_to_job() {
        let job = UserStateJob::SnapshotUpdated {
            snapshot: snapshot(),
        };
        let raw = JobEnvelope::new(&job).encode().unwrap();

        let decoded = JobEnvelope::decode(&raw).unwrap().to_job().unwrap();
        assert_eq!(decoded, job);
        assert_eq!(decoded.user_id(), "u1");
    }

    #[test]
    fn test_unknown_kind_is_reported() {
        let raw = r#"{"id":"1","name":"USER_DELETED","data":{}}"#;
        let err = JobEnvelope::decode(raw).unwrap().to_job().unwrap_err();
        assert!(matches!(err, JobDecodeError::UnknownKind(name) if name == "USER_DELETED"));
    }

    #[test]
    fn test_missing_payload_fields() {
        let raw = r#"{"id":"1","name":"USER_SNAPSHOT_UPDATED","data":{}}"#;
        assert!(matches!(
            JobEnvelope::decode(raw).unwrap().to_job(),
            Err(JobDecodeError::MissingSnapshot)
        ));

        let raw = r#"{"id":"1","name":"USER_SNAPSHOT_UPDATED"}"#;
        assert!(matches!(
            JobEnvelope::decode(raw).unwrap().to_job(),
            Err(JobDecodeError::MissingSnapshot)
        ));

        let raw = r#"{"id":"1","name":"USER_INVALIDATE_TOKENS","data":{"userId":""}}"#;
        assert!(matches!(
            JobEnvelope::decode(raw).unwrap().to_job(),
            Err(JobDecodeError::MissingUserId)
        ));
    }

    #[test]
    fn test_malformed_snapshot_is_reported() {
        let raw = r#"{"id":"1","name":"USER_SNAPSHOT_UPDATED","data":{"snapshot":{"id":7}}}"#;
        assert!(matches!(
            JobEnvelope::decode(raw).unwrap().to_job(),
            Err(JobDecodeError::Malformed(_))
        ));
        assert!(matches!(
            JobEnvelope::decode("not json"),
            Err(JobDecodeError::Malformed(_))
        ));
    }
}
