//! Identity Registry
//!
//! Tracks root identities and their context identities on the ledger. The ledger
//! owns `context_count`; this side only does check-then-write with bounded retry,
//! and turns "already exists" / "already applied" answers into successful outcomes.

use std::future::Future;
use std::time::Duration;

use alloy_primitives::B256;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::crypto::derive::context_addresses;
use crate::domain::identity::{ContextCategory, ContextIdentity, OwnerKey, PrivacyLevel, RootIdentity};
use crate::domain::outcome::{Outcome, RevokeOutcome};
use crate::error::ErrorClass;
use crate::ports::ledger::{LedgerError, LedgerPort};
use crate::retry::{retry, with_deadline, RetryError, RetryPolicy, Transient};

/// Default deadline for a single ledger call.
pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no root identity for owner {0}")]
    RootNotFound(OwnerKey),

    #[error("no context at index {index} under root {root}")]
    ContextNotFound { root: B256, index: u64 },

    #[error("context {0} is revoked")]
    ContextRevoked(B256),

    #[error("context {address} is not the record at index {index} under root {root}")]
    ContextMismatch { address: B256, root: B256, index: u64 },

    #[error("amount {amount} exceeds per-operation limit {limit}")]
    ExceedsOperationLimit { amount: u64, limit: u64 },

    #[error("committed total of context {0} would overflow")]
    CommittedOverflow(B256),

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: String,
    },

    /// The write may or may not have landed; re-read before trying again.
    #[error("{operation} not confirmed: {reason}")]
    Unconfirmed {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation} failed: {reason}")]
    Ledger {
        operation: &'static str,
        reason: String,
    },
}

impl RegistryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RegistryError::RetriesExhausted { .. } | RegistryError::Unconfirmed { .. } => {
                ErrorClass::Transient
            }
            RegistryError::Ledger { .. } => ErrorClass::Fatal,
            _ => ErrorClass::Validation,
        }
    }

    fn from_retry(operation: &'static str, error: RetryError<LedgerError>) -> Self {
        match error {
            RetryError::Exhausted { attempts, last } => RegistryError::RetriesExhausted {
                operation,
                attempts,
                last: last.to_string(),
            },
            RetryError::Fatal(error) => RegistryError::Ledger {
                operation,
                reason: error.to_string(),
            },
        }
    }
}

/// Validation shared by `check_spending_limit` and `record_commitment`.
fn ensure_can_commit(context: &ContextIdentity, amount: u64) -> Result<(), RegistryError> {
    if context.revoked {
        return Err(RegistryError::ContextRevoked(context.address));
    }
    if let Some(limit) = context.max_per_operation
        && amount > limit
    {
        return Err(RegistryError::ExceedsOperationLimit { amount, limit });
    }
    Ok(())
}

pub struct IdentityRegistry<L> {
    ledger: L,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<L: LedgerPort> IdentityRegistry<L> {
    pub fn new(ledger: L) -> Self {
        Self::with_policy(ledger, RetryPolicy::default(), DEFAULT_LEDGER_TIMEOUT)
    }

    pub fn with_policy(ledger: L, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            ledger,
            retry,
            timeout,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// One deadline-bounded ledger call, retried on transient failure.
    async fn attempt<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, RetryError<LedgerError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let timeout = self.timeout;
        retry(&self.retry, operation, move || {
            with_deadline(timeout, call(), || LedgerError::Timeout)
        })
        .await
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, RegistryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        self.attempt(operation, call)
            .await
            .map_err(|e| RegistryError::from_retry(operation, e))
    }

    /// Read the root identity for `owner`.
    pub async fn root(&self, owner: OwnerKey) -> Result<RootIdentity, RegistryError> {
        self.call("read_root", || self.ledger.read_root(owner))
            .await?
            .ok_or(RegistryError::RootNotFound(owner))
    }

    /// Create the root identity for `owner`, or return the existing one.
    pub async fn create_root(
        &self,
        owner: OwnerKey,
        privacy_level: PrivacyLevel,
    ) -> Result<Outcome<RootIdentity>, RegistryError> {
        if let Some(existing) = self.call("read_root", || self.ledger.read_root(owner)).await? {
            debug!(root = %existing.address, "root identity already exists");
            return Ok(Outcome::AlreadyExisted(existing));
        }

        let record = RootIdentity::new(owner, privacy_level, Utc::now());
        let rec = &record;
        match self
            .attempt("write_root", move || self.ledger.write_root(rec))
            .await
        {
            Ok(()) => {
                info!(
                    root = %record.address,
                    privacy_level = ?record.privacy_level,
                    created_at = %record.created_at,
                    "root identity created"
                );
                Ok(Outcome::Created(record))
            }
            Err(RetryError::Fatal(LedgerError::AlreadyExists)) => {
                warn!(root = %record.address, "root written concurrently, returning ledger record");
                Ok(Outcome::AlreadyExisted(self.root(owner).await?))
            }
            Err(e) => Err(RegistryError::from_retry("write_root", e)),
        }
    }

    /// Create the next context identity under `root`.
    ///
    /// The index comes from a fresh read of the root, not from `root.context_count`.
    /// After a write whose outcome is unknown (timeout, outage) the same index is
    /// re-read before anything else: a record with the requested category and limit
    /// is adopted as `AlreadyExisted` instead of being written a second time.
    pub async fn create_context(
        &self,
        root: &RootIdentity,
        category: ContextCategory,
        max_per_operation: Option<u64>,
    ) -> Result<Outcome<ContextIdentity>, RegistryError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut unconfirmed: Option<u64> = None;
        let mut last = String::new();

        for attempt in 1..=max_attempts {
            if let Some(index) = unconfirmed.take()
                && let Some(existing) = self
                    .adopt_unconfirmed(root, index, category, max_per_operation)
                    .await?
            {
                return Ok(Outcome::AlreadyExisted(existing));
            }

            let current = self.root(root.owner).await?;
            let record = ContextIdentity::new(
                &current,
                current.context_count,
                category,
                max_per_operation,
                Utc::now(),
            );

            let write = self.ledger.write_context(&record);
            match with_deadline(self.timeout, write, || LedgerError::Timeout).await {
                Ok(()) => {
                    info!(
                        root = %record.root,
                        context = %record.address,
                        index = record.index,
                        category = ?record.category,
                        max_per_operation = ?record.max_per_operation,
                        "context identity created"
                    );
                    return Ok(Outcome::Created(record));
                }
                Err(e @ (LedgerError::IndexConflict { .. } | LedgerError::AlreadyExists)) => {
                    debug!(index = record.index, error = %e, "context index taken, re-reading root");
                    last = e.to_string();
                }
                Err(e) if e.is_transient() => {
                    warn!(index = record.index, attempt, error = %e, "context write unconfirmed");
                    unconfirmed = Some(record.index);
                    last = e.to_string();
                }
                Err(e) => {
                    return Err(RegistryError::Ledger {
                        operation: "write_context",
                        reason: e.to_string(),
                    });
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.retry.backoff(attempt)).await;
            }
        }

        if let Some(index) = unconfirmed
            && let Some(existing) = self
                .adopt_unconfirmed(root, index, category, max_per_operation)
                .await?
        {
            return Ok(Outcome::AlreadyExisted(existing));
        }

        Err(RegistryError::RetriesExhausted {
            operation: "write_context",
            attempts: max_attempts,
            last,
        })
    }

    /// Look for a record left behind by an unconfirmed context write at `index`.
    async fn adopt_unconfirmed(
        &self,
        root: &RootIdentity,
        index: u64,
        category: ContextCategory,
        max_per_operation: Option<u64>,
    ) -> Result<Option<ContextIdentity>, RegistryError> {
        let found = self
            .call("read_context", || self.ledger.read_context(root.address, index))
            .await?;
        Ok(found
            .filter(|c| c.category == category && c.max_per_operation == max_per_operation)
            .inspect(|c| {
                warn!(
                    context = %c.address,
                    index,
                    "unconfirmed context write had landed, adopting record"
                );
            }))
    }

    /// Read the context at `index` under `root`.
    pub async fn context(
        &self,
        root: &RootIdentity,
        index: u64,
    ) -> Result<ContextIdentity, RegistryError> {
        self.call("read_context", || self.ledger.read_context(root.address, index))
            .await?
            .ok_or(RegistryError::ContextNotFound {
                root: root.address,
                index,
            })
    }

    /// Regenerate every context address of `root` and read the records back.
    pub async fn contexts(&self, root: &RootIdentity) -> Result<Vec<ContextIdentity>, RegistryError> {
        let current = self.root(root.owner).await?;
        let mut records = Vec::new();
        for (index, expected) in (0u64..).zip(context_addresses(current.address, current.context_count)) {
            let record = self.context(&current, index).await?;
            if record.address != expected {
                return Err(RegistryError::Ledger {
                    operation: "read_context",
                    reason: format!(
                        "record at index {index} has address {}, derived {expected}",
                        record.address
                    ),
                });
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Fresh ledger copy of `context`, checked to be the record it claims to be.
    pub async fn current(&self, context: &ContextIdentity) -> Result<ContextIdentity, RegistryError> {
        let mismatch = || RegistryError::ContextMismatch {
            address: context.address,
            root: context.root,
            index: context.index,
        };
        if !context.is_well_formed() {
            return Err(mismatch());
        }
        let stored = self
            .call("read_context", || {
                self.ledger.read_context(context.root, context.index)
            })
            .await?
            .ok_or(RegistryError::ContextNotFound {
                root: context.root,
                index: context.index,
            })?;
        if stored.address != context.address {
            return Err(mismatch());
        }
        Ok(stored)
    }

    /// Revoke a context. Revoking an already-revoked context issues no write.
    pub async fn revoke(&self, context: &ContextIdentity) -> Result<RevokeOutcome, RegistryError> {
        let current = self.current(context).await?;
        if current.revoked {
            debug!(context = %current.address, "context already revoked");
            return Ok(RevokeOutcome::AlreadyRevoked(current));
        }

        let address = current.address;
        let revoked = ContextIdentity {
            revoked: true,
            ..current
        };
        match self
            .attempt("write_revocation", || self.ledger.write_revocation(address))
            .await
        {
            Ok(()) => {
                info!(context = %address, index = revoked.index, "context identity revoked");
                Ok(RevokeOutcome::Revoked(revoked))
            }
            Err(RetryError::Fatal(LedgerError::AlreadyApplied)) => {
                warn!(context = %address, "revocation already applied on ledger");
                Ok(RevokeOutcome::AlreadyRevoked(revoked))
            }
            Err(e) => Err(RegistryError::from_retry("write_revocation", e)),
        }
    }

    /// Check that `amount` could be committed against `context` right now.
    pub async fn check_spending_limit(
        &self,
        context: &ContextIdentity,
        amount: u64,
    ) -> Result<(), RegistryError> {
        let current = self.current(context).await?;
        ensure_can_commit(&current, amount)
    }

    /// Add `amount` to the context's committed total and return the updated record.
    ///
    /// Not retried: a lost confirmation would otherwise count the amount twice.
    pub async fn record_commitment(
        &self,
        context: &ContextIdentity,
        amount: u64,
    ) -> Result<ContextIdentity, RegistryError> {
        let current = self.current(context).await?;
        ensure_can_commit(&current, amount)?;
        if current.total_committed.checked_add(amount).is_none() {
            return Err(RegistryError::CommittedOverflow(current.address));
        }

        let write = self.ledger.write_commitment_total(current.address, amount);
        let total = match with_deadline(self.timeout, write, || LedgerError::Timeout).await {
            Ok(total) => total,
            Err(e) if e.is_transient() => {
                return Err(RegistryError::Unconfirmed {
                    operation: "write_commitment_total",
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                return Err(RegistryError::Ledger {
                    operation: "write_commitment_total",
                    reason: e.to_string(),
                });
            }
        };

        info!(context = %current.address, amount, total, "commitment recorded");
        Ok(ContextIdentity {
            total_committed: total,
            ..current
        })
    }

    /// Replace the advisory privacy level of the owner's root identity.
    pub async fn update_privacy_level(
        &self,
        owner: OwnerKey,
        level: PrivacyLevel,
    ) -> Result<RootIdentity, RegistryError> {
        let current = self.root(owner).await?;
        if current.privacy_level == level {
            return Ok(current);
        }

        self.call("write_privacy_level", || {
            self.ledger.write_privacy_level(owner, level)
        })
        .await?;

        info!(
            root = %current.address,
            old_level = ?current.privacy_level,
            new_level = ?level,
            "privacy level updated"
        );
        Ok(RootIdentity {
            privacy_level: level,
            ..current
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::adapters::memory_ledger::InMemoryLedger;

    /// How a scripted ledger call misbehaves.
    #[derive(Debug, Clone, Copy)]
    enum Fault {
        /// Times out without applying the write
        Dropped,
        /// Applies the write, then times out
        LostAck,
    }

    /// Wraps `InMemoryLedger` with scripted faults per operation.
    struct FlakyLedger {
        inner: InMemoryLedger,
        faults: StdMutex<HashMap<&'static str, VecDeque<Fault>>>,
        revocation_writes: AtomicU32,
        /// Serve context reads as if revocations had not propagated yet
        stale_revocations: bool,
        /// Yield after each root read so concurrent writers see the same counter
        interleave_root_reads: bool,
        context_conflicts: AtomicU32,
    }

    impl FlakyLedger {
        fn new() -> Self {
            Self {
                inner: InMemoryLedger::new(),
                faults: StdMutex::new(HashMap::new()),
                revocation_writes: AtomicU32::new(0),
                stale_revocations: false,
                interleave_root_reads: false,
                context_conflicts: AtomicU32::new(0),
            }
        }

        fn fail(self, operation: &'static str, faults: &[Fault]) -> Self {
            self.faults
                .lock()
                .unwrap()
                .entry(operation)
                .or_default()
                .extend(faults);
            self
        }

        fn next_fault(&self, operation: &'static str) -> Option<Fault> {
            self.faults
                .lock()
                .unwrap()
                .get_mut(operation)
                .and_then(VecDeque::pop_front)
        }

        async fn faulty<T>(
            &self,
            operation: &'static str,
            call: impl Future<Output = Result<T, LedgerError>>,
        ) -> Result<T, LedgerError> {
            match self.next_fault(operation) {
                Some(Fault::Dropped) => Err(LedgerError::Timeout),
                Some(Fault::LostAck) => {
                    call.await?;
                    Err(LedgerError::Timeout)
                }
                None => call.await,
            }
        }
    }

    impl LedgerPort for FlakyLedger {
        async fn read_root(&self, owner: OwnerKey) -> Result<Option<RootIdentity>, LedgerError> {
            let record = self.faulty("read_root", self.inner.read_root(owner)).await;
            if self.interleave_root_reads {
                tokio::task::yield_now().await;
            }
            record
        }

        async fn write_root(&self, record: &RootIdentity) -> Result<(), LedgerError> {
            self.faulty("write_root", self.inner.write_root(record)).await
        }

        async fn read_context(
            &self,
            root: B256,
            index: u64,
        ) -> Result<Option<ContextIdentity>, LedgerError> {
            let record = self
                .faulty("read_context", self.inner.read_context(root, index))
                .await?;
            Ok(record.map(|c| ContextIdentity {
                revoked: c.revoked && !self.stale_revocations,
                ..c
            }))
        }

        async fn write_context(&self, record: &ContextIdentity) -> Result<(), LedgerError> {
            let result = self
                .faulty("write_context", self.inner.write_context(record))
                .await;
            if let Err(LedgerError::IndexConflict { .. } | LedgerError::AlreadyExists) = result {
                self.context_conflicts.fetch_add(1, Ordering::SeqCst);
            }
            result
        }

        async fn write_revocation(&self, context: B256) -> Result<(), LedgerError> {
            self.revocation_writes.fetch_add(1, Ordering::SeqCst);
            self.faulty("write_revocation", self.inner.write_revocation(context))
                .await
        }

        async fn write_commitment_total(
            &self,
            context: B256,
            amount: u64,
        ) -> Result<u64, LedgerError> {
            self.faulty(
                "write_commitment_total",
                self.inner.write_commitment_total(context, amount),
            )
            .await
        }

        async fn write_privacy_level(
            &self,
            owner: OwnerKey,
            level: PrivacyLevel,
        ) -> Result<(), LedgerError> {
            self.faulty(
                "write_privacy_level",
                self.inner.write_privacy_level(owner, level),
            )
            .await
        }
    }

    fn registry(ledger: FlakyLedger) -> IdentityRegistry<FlakyLedger> {
        IdentityRegistry::with_policy(
            ledger,
            RetryPolicy::new(3, Duration::from_millis(1)),
            Duration::from_secs(1),
        )
    }

    fn owner() -> OwnerKey {
        OwnerKey(B256::repeat_byte(0x0A))
    }

    async fn registry_with_root(
        ledger: FlakyLedger,
    ) -> (IdentityRegistry<FlakyLedger>, RootIdentity) {
        let registry = registry(ledger);
        let root = registry
            .create_root(owner(), PrivacyLevel::High)
            .await
            .unwrap()
            .into_inner();
        (registry, root)
    }

    #[tokio::test]
    async fn test_create_root_is_idempotent() {
        let registry = registry(FlakyLedger::new());

        let first = registry.create_root(owner(), PrivacyLevel::High).await.unwrap();
        let second = registry.create_root(owner(), PrivacyLevel::Low).await.unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.get(), second.get());
        assert_eq!(second.get().context_count, 0);
        assert_eq!(second.get().privacy_level, PrivacyLevel::High);
    }

    #[tokio::test]
    async fn test_racing_root_creates_leave_one_record() {
        let registry = registry(FlakyLedger::new());

        let (a, b) = tokio::join!(
            registry.create_root(owner(), PrivacyLevel::High),
            registry.create_root(owner(), PrivacyLevel::High),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.get(), b.get());
        assert_eq!(
            [a.is_created(), b.is_created()].iter().filter(|c| **c).count(),
            1
        );
        assert_eq!(registry.ledger().inner.root_count().await, 1);
    }

    #[tokio::test]
    async fn test_lost_root_ack_returns_existing_record() {
        let ledger = FlakyLedger::new().fail("write_root", &[Fault::LostAck]);
        let registry = registry(ledger);

        let outcome = registry.create_root(owner(), PrivacyLevel::High).await.unwrap();

        assert!(!outcome.is_created());
        assert_eq!(outcome.get().owner, owner());
        assert_eq!(registry.ledger().inner.root_count().await, 1);
    }

    #[tokio::test]
    async fn test_context_indices_are_sequential() {
        let (registry, root) = registry_with_root(FlakyLedger::new()).await;

        let first = registry
            .create_context(&root, ContextCategory::DeFi, Some(1000))
            .await
            .unwrap();
        let second = registry
            .create_context(&root, ContextCategory::DeFi, Some(1000))
            .await
            .unwrap();

        assert!(first.is_created() && second.is_created());
        assert_eq!(first.get().index, 0);
        assert_eq!(second.get().index, 1);
        assert_ne!(first.get().address, second.get().address);
        assert_eq!(registry.root(owner()).await.unwrap().context_count, 2);
    }

    #[tokio::test]
    async fn test_stale_root_record_does_not_reuse_index() {
        let (registry, stale_root) = registry_with_root(FlakyLedger::new()).await;
        registry
            .create_context(&stale_root, ContextCategory::DeFi, None)
            .await
            .unwrap();

        // stale_root still says context_count == 0
        let next = registry
            .create_context(&stale_root, ContextCategory::Social, None)
            .await
            .unwrap();
        assert_eq!(next.get().index, 1);
    }

    #[tokio::test]
    async fn test_concurrent_contexts_get_distinct_gapless_indices() {
        let ledger = FlakyLedger {
            interleave_root_reads: true,
            ..FlakyLedger::new()
        };
        let registry = IdentityRegistry::with_policy(
            ledger,
            RetryPolicy::new(5, Duration::from_millis(1)),
            Duration::from_secs(1),
        );
        let root = registry
            .create_root(owner(), PrivacyLevel::High)
            .await
            .unwrap()
            .into_inner();

        let (a, b, c) = tokio::join!(
            registry.create_context(&root, ContextCategory::DeFi, None),
            registry.create_context(&root, ContextCategory::Social, None),
            registry.create_context(&root, ContextCategory::Gaming, None),
        );
        let mut indices: Vec<u64> = [a, b, c]
            .into_iter()
            .map(|outcome| {
                let outcome = outcome.unwrap();
                assert!(outcome.is_created());
                outcome.into_inner().index
            })
            .collect();
        indices.sort_unstable();

        assert_eq!(indices, vec![0, 1, 2]);
        assert!(registry.ledger().context_conflicts.load(Ordering::SeqCst) > 0);
        assert_eq!(registry.root(owner()).await.unwrap().context_count, 3);
        assert_eq!(registry.ledger().inner.context_count(root.address).await, 3);
    }

    #[tokio::test]
    async fn test_lost_context_ack_is_adopted_not_duplicated() {
        let ledger = FlakyLedger::new().fail("write_context", &[Fault::LostAck]);
        let (registry, root) = registry_with_root(ledger).await;

        let outcome = registry
            .create_context(&root, ContextCategory::DeFi, Some(1000))
            .await
            .unwrap();

        assert!(!outcome.is_created());
        assert_eq!(outcome.get().index, 0);
        assert_eq!(registry.root(owner()).await.unwrap().context_count, 1);
        assert_eq!(registry.ledger().inner.context_count(root.address).await, 1);

        let next = registry
            .create_context(&root, ContextCategory::DeFi, Some(1000))
            .await
            .unwrap();
        assert_eq!(next.get().index, 1);
    }

    #[tokio::test]
    async fn test_dropped_context_write_retries_same_index() {
        let ledger = FlakyLedger::new().fail("write_context", &[Fault::Dropped, Fault::Dropped]);
        let (registry, root) = registry_with_root(ledger).await;

        let outcome = registry
            .create_context(&root, ContextCategory::Gaming, None)
            .await
            .unwrap();

        assert!(outcome.is_created());
        assert_eq!(outcome.get().index, 0);
        assert_eq!(registry.root(owner()).await.unwrap().context_count, 1);
    }

    #[tokio::test]
    async fn test_exhausted_root_write_is_transient() {
        let ledger = FlakyLedger::new().fail(
            "write_root",
            &[Fault::Dropped, Fault::Dropped, Fault::Dropped],
        );
        let registry = registry(ledger);

        let err = registry
            .create_root(owner(), PrivacyLevel::High)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistryError::RetriesExhausted {
                operation: "write_root",
                attempts: 3,
                ..
            }
        ));
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_revoke_twice_issues_one_write() {
        let (registry, root) = registry_with_root(FlakyLedger::new()).await;
        let context = registry
            .create_context(&root, ContextCategory::DeFi, None)
            .await
            .unwrap()
            .into_inner();

        let first = registry.revoke(&context).await.unwrap();
        let second = registry.revoke(&context).await.unwrap();

        assert!(first.was_applied());
        assert!(!second.was_applied());
        assert!(first.context().revoked && second.context().revoked);
        assert_eq!(registry.ledger().revocation_writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_applied_revocation_is_success() {
        let mut ledger = FlakyLedger::new();
        ledger.stale_revocations = true;
        let (registry, root) = registry_with_root(ledger).await;
        let context = registry
            .create_context(&root, ContextCategory::Temporary, None)
            .await
            .unwrap()
            .into_inner();

        registry.revoke(&context).await.unwrap();
        let second = registry.revoke(&context).await.unwrap();

        assert!(!second.was_applied());
        assert!(second.context().revoked);
    }

    #[tokio::test]
    async fn test_revoke_rejects_foreign_context() {
        let (registry, root) = registry_with_root(FlakyLedger::new()).await;
        let mut context = registry
            .create_context(&root, ContextCategory::DeFi, None)
            .await
            .unwrap()
            .into_inner();
        context.address = B256::repeat_byte(0xEE);

        let err = registry.revoke(&context).await.unwrap_err();
        assert!(matches!(err, RegistryError::ContextMismatch { .. }));
        assert_eq!(err.class(), ErrorClass::Validation);
    }

    #[tokio::test]
    async fn test_record_commitment_accumulates_within_limit() {
        let (registry, root) = registry_with_root(FlakyLedger::new()).await;
        let context = registry
            .create_context(&root, ContextCategory::DeFi, Some(1000))
            .await
            .unwrap()
            .into_inner();

        let after_first = registry.record_commitment(&context, 600).await.unwrap();
        let after_second = registry.record_commitment(&context, 600).await.unwrap();
        assert_eq!(after_first.total_committed, 600);
        assert_eq!(after_second.total_committed, 1200);

        assert_eq!(
            registry.check_spending_limit(&context, 1001).await.unwrap_err(),
            RegistryError::ExceedsOperationLimit {
                amount: 1001,
                limit: 1000
            }
        );
    }

    #[tokio::test]
    async fn test_revoked_context_accepts_no_commitment() {
        let (registry, root) = registry_with_root(FlakyLedger::new()).await;
        let context = registry
            .create_context(&root, ContextCategory::DeFi, None)
            .await
            .unwrap()
            .into_inner();
        registry.revoke(&context).await.unwrap();

        assert_eq!(
            registry.record_commitment(&context, 1).await.unwrap_err(),
            RegistryError::ContextRevoked(context.address)
        );
    }

    #[tokio::test]
    async fn test_lost_commitment_ack_is_not_retried() {
        let ledger = FlakyLedger::new().fail("write_commitment_total", &[Fault::LostAck]);
        let (registry, root) = registry_with_root(ledger).await;
        let context = registry
            .create_context(&root, ContextCategory::DeFi, None)
            .await
            .unwrap()
            .into_inner();

        let err = registry.record_commitment(&context, 50).await.unwrap_err();
        assert!(matches!(err, RegistryError::Unconfirmed { .. }));

        let current = registry.current(&context).await.unwrap();
        assert_eq!(current.total_committed, 50);
    }

    #[tokio::test]
    async fn test_update_privacy_level() {
        let (registry, _) = registry_with_root(FlakyLedger::new()).await;

        let updated = registry
            .update_privacy_level(owner(), PrivacyLevel::Maximum)
            .await
            .unwrap();
        assert_eq!(updated.privacy_level, PrivacyLevel::Maximum);
        assert_eq!(
            registry.root(owner()).await.unwrap().privacy_level,
            PrivacyLevel::Maximum
        );

        let stranger = OwnerKey(B256::repeat_byte(0x0B));
        assert_eq!(
            registry
                .update_privacy_level(stranger, PrivacyLevel::Low)
                .await
                .unwrap_err(),
            RegistryError::RootNotFound(stranger)
        );
    }

    #[tokio::test]
    async fn test_contexts_regenerates_all_addresses() {
        let (registry, root) = registry_with_root(FlakyLedger::new()).await;
        for category in [ContextCategory::DeFi, ContextCategory::Social, ContextCategory::Gaming] {
            registry.create_context(&root, category, None).await.unwrap();
        }

        let contexts = registry.contexts(&root).await.unwrap();
        let expected: Vec<B256> = context_addresses(root.address, 3).collect();

        assert_eq!(
            contexts.iter().map(|c| c.address).collect::<Vec<_>>(),
            expected
        );
        assert_eq!(contexts[1].category, ContextCategory::Social);
    }
}
