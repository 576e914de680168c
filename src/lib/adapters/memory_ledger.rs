use alloy_primitives::B256;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::crypto::derive::context_address;
use crate::domain::identity::{ContextIdentity, OwnerKey, PrivacyLevel, RootIdentity};
use crate::ports::ledger::{LedgerError, LedgerPort};

#[derive(Default)]
struct LedgerState {
    roots: HashMap<OwnerKey, RootIdentity>,
    /// Root address -> owner, for context writes that only carry the root address
    root_owners: HashMap<B256, OwnerKey>,
    /// Keyed by context address
    contexts: HashMap<B256, ContextIdentity>,
}

/// In-memory implementation of `LedgerPort` for PoC and testing.
///
/// A single lock covers every record, so `write_context` persists the record and
/// bumps the root's counter as one step, the way a contract call would.
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Number of root identity records held.
    pub async fn root_count(&self) -> usize {
        self.state.lock().await.roots.len()
    }

    /// Number of context records held under `root`.
    pub async fn context_count(&self, root: B256) -> usize {
        let state = self.state.lock().await;
        state.contexts.values().filter(|c| c.root == root).count()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerPort for InMemoryLedger {
    async fn read_root(&self, owner: OwnerKey) -> Result<Option<RootIdentity>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state.roots.get(&owner).cloned())
    }

    async fn write_root(&self, record: &RootIdentity) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        if state.roots.contains_key(&record.owner) {
            return Err(LedgerError::AlreadyExists);
        }
        state.root_owners.insert(record.address, record.owner);
        state.roots.insert(record.owner, record.clone());
        Ok(())
    }

    async fn read_context(
        &self,
        root: B256,
        index: u64,
    ) -> Result<Option<ContextIdentity>, LedgerError> {
        let state = self.state.lock().await;
        let address = context_address(root, index);
        Ok(state
            .contexts
            .get(&address)
            .filter(|c| c.root == root && c.index == index)
            .cloned())
    }

    async fn write_context(&self, record: &ContextIdentity) -> Result<(), LedgerError> {
        if !record.is_well_formed() {
            return Err(LedgerError::Rejected(format!(
                "address {} is not derived from root {} at index {}",
                record.address, record.root, record.index
            )));
        }

        let mut state = self.state.lock().await;
        let owner = *state
            .root_owners
            .get(&record.root)
            .ok_or(LedgerError::NotFound(record.root))?;

        if state.contexts.contains_key(&record.address) {
            return Err(LedgerError::AlreadyExists);
        }

        let root = state
            .roots
            .get_mut(&owner)
            .ok_or(LedgerError::NotFound(record.root))?;
        if root.context_count != record.index {
            return Err(LedgerError::IndexConflict {
                expected: root.context_count,
                attempted: record.index,
            });
        }
        root.context_count = root
            .context_count
            .checked_add(1)
            .ok_or_else(|| LedgerError::Rejected("context index overflow".into()))?;

        state.contexts.insert(record.address, record.clone());
        Ok(())
    }

    async fn write_revocation(&self, context: B256) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        let record = state
            .contexts
            .get_mut(&context)
            .ok_or(LedgerError::NotFound(context))?;
        if record.revoked {
            return Err(LedgerError::AlreadyApplied);
        }
        record.revoked = true;
        Ok(())
    }

    async fn write_commitment_total(&self, context: B256, amount: u64) -> Result<u64, LedgerError> {
        let mut state = self.state.lock().await;
        let record = state
            .contexts
            .get_mut(&context)
            .ok_or(LedgerError::NotFound(context))?;

        if record.revoked {
            return Err(LedgerError::Rejected("context revoked".into()));
        }
        if !record.within_limit(amount) {
            return Err(LedgerError::Rejected("exceeds per-operation limit".into()));
        }
        record.total_committed = record
            .total_committed
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Rejected("committed total overflow".into()))?;
        Ok(record.total_committed)
    }

    async fn write_privacy_level(
        &self,
        owner: OwnerKey,
        level: PrivacyLevel,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        let root = state
            .roots
            .get_mut(&owner)
            .ok_or(LedgerError::NotFound(owner.0))?;
        root.privacy_level = level;
        Ok(())
    }
}
