use serde::{Deserialize, Serialize};

use super::identity::ContextIdentity;

/// Result of an idempotent create.
///
/// A duplicate create is a success carrying the record already on the ledger,
/// never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "record", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// This call wrote the record.
    Created(T),
    /// The record was already present (earlier call, racing writer, or a
    /// previous attempt whose confirmation was lost).
    AlreadyExisted(T),
}

impl<T> Outcome<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Self::Created(record) | Self::AlreadyExisted(record) => record,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Created(record) | Self::AlreadyExisted(record) => record,
        }
    }
}

/// Result of an idempotent revoke. Both variants leave the context revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "context", rename_all = "snake_case")]
pub enum RevokeOutcome {
    /// This call issued the revocation.
    Revoked(ContextIdentity),
    /// The context was already revoked; no state change was issued.
    AlreadyRevoked(ContextIdentity),
}

impl RevokeOutcome {
    pub fn context(&self) -> &ContextIdentity {
        match self {
            Self::Revoked(context) | Self::AlreadyRevoked(context) => context,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Self::Revoked(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let created = Outcome::Created(7u64);
        let existed = Outcome::AlreadyExisted(7u64);

        assert!(created.is_created());
        assert!(!existed.is_created());
        assert_eq!(created.get(), existed.get());
        assert_eq!(existed.into_inner(), 7);
    }

    #[test]
    fn test_outcome_status_is_serialized() {
        let json = serde_json::to_value(Outcome::AlreadyExisted(1u8)).unwrap();
        assert_eq!(json["status"], "already_existed");
        assert_eq!(json["record"], 1);
    }
}
