use alloy_primitives::B256;
use std::future::Future;

use crate::domain::identity::{ContextIdentity, OwnerKey, PrivacyLevel, RootIdentity};
use crate::retry::Transient;

/// Port for the durable ledger that stores identity records.
///
/// The ledger is the serialization point for `context_count`: `write_context`
/// must persist the record and increment its root's counter atomically, and
/// must reject a record whose index is not the current counter value.
/// Only fully-formed records are ever written.
///
/// Implementations:
/// - `InMemoryLedger` (for PoC/testing)
pub trait LedgerPort: Send + Sync {
    /// Read the root identity for an owner, if one exists.
    fn read_root(
        &self,
        owner: OwnerKey,
    ) -> impl Future<Output = Result<Option<RootIdentity>, LedgerError>> + Send;

    /// Persist a new root identity. Reports `AlreadyExists` if the owner has one.
    fn write_root(
        &self,
        record: &RootIdentity,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Read the context at `index` under the root at `root`.
    fn read_context(
        &self,
        root: B256,
        index: u64,
    ) -> impl Future<Output = Result<Option<ContextIdentity>, LedgerError>> + Send;

    /// Persist a new context and increment the root's `context_count`.
    ///
    /// `AlreadyExists` if a record already occupies the index, `IndexConflict`
    /// if the index is not the root's current counter.
    fn write_context(
        &self,
        record: &ContextIdentity,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Mark a context revoked. `AlreadyApplied` if it already was.
    fn write_revocation(
        &self,
        context: B256,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Add `amount` to a context's committed total. Returns the new total.
    fn write_commitment_total(
        &self,
        context: B256,
        amount: u64,
    ) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    /// Replace the advisory privacy level of a root.
    fn write_privacy_level(
        &self,
        owner: OwnerKey,
        level: PrivacyLevel,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("record already exists")]
    AlreadyExists,

    #[error("state change already applied")]
    AlreadyApplied,

    #[error("index conflict: ledger expects {expected}, write attempted {attempted}")]
    IndexConflict { expected: u64, attempted: u64 },

    #[error("record not found: {0}")]
    NotFound(B256),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("malformed ledger response: {0}")]
    Malformed(String),

    #[error("ledger request timed out")]
    Timeout,

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl Transient for LedgerError {
    fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Timeout | LedgerError::Unavailable(_))
    }
}
