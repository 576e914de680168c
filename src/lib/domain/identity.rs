use std::fmt;

use alloy_primitives::B256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::derive::{context_address, root_address};

/// Opaque principal key supplied by the wallet layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerKey(pub B256);

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Advisory privacy level of a root identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PrivacyLevel {
    /// Full anonymity
    Maximum = 0,
    /// Minimal disclosure
    High = 1,
    /// Balanced
    Medium = 2,
    /// More transparent
    Low = 3,
    /// Fully public
    Public = 4,
}

impl TryFrom<u8> for PrivacyLevel {
    type Error = InvalidCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Maximum),
            1 => Ok(Self::High),
            2 => Ok(Self::Medium),
            3 => Ok(Self::Low),
            4 => Ok(Self::Public),
            other => Err(InvalidCode::PrivacyLevel(other)),
        }
    }
}

/// Use-case label of a context identity. Opaque beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ContextCategory {
    /// Dark pool trading, swaps
    DeFi = 0,
    Social = 1,
    Gaming = 2,
    Professional = 3,
    /// Burned after use
    Temporary = 4,
    Public = 5,
}

impl TryFrom<u8> for ContextCategory {
    type Error = InvalidCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::DeFi),
            1 => Ok(Self::Social),
            2 => Ok(Self::Gaming),
            3 => Ok(Self::Professional),
            4 => Ok(Self::Temporary),
            5 => Ok(Self::Public),
            other => Err(InvalidCode::ContextCategory(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidCode {
    #[error("invalid privacy level {0}: must be 0-4")]
    PrivacyLevel(u8),

    #[error("invalid context category {0}: must be 0-5")]
    ContextCategory(u8),
}

/// Top-level identity record, one per owner. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootIdentity {
    pub owner: OwnerKey,
    /// Derived from `owner`; the namespace for every context address
    pub address: B256,
    pub created_at: DateTime<Utc>,
    pub privacy_level: PrivacyLevel,
    /// Next free context index
    pub context_count: u64,
}

impl RootIdentity {
    /// Build a fresh record with no contexts.
    pub fn new(owner: OwnerKey, privacy_level: PrivacyLevel, created_at: DateTime<Utc>) -> Self {
        Self {
            owner,
            address: root_address(&owner),
            created_at,
            privacy_level,
            context_count: 0,
        }
    }
}

/// Disposable sub-identity derived from a root at a fixed index.
///
/// Append-only: the only mutations are `total_committed` growing and
/// `revoked` flipping from false to true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextIdentity {
    /// Address of the owning root identity
    pub root: B256,
    pub address: B256,
    pub index: u64,
    pub category: ContextCategory,
    pub created_at: DateTime<Utc>,
    /// Per-operation ceiling enforced by the ledger. `None` means unlimited.
    pub max_per_operation: Option<u64>,
    pub total_committed: u64,
    pub revoked: bool,
}

impl ContextIdentity {
    /// Build a fresh, active context record at `index` under `root`.
    pub fn new(
        root: &RootIdentity,
        index: u64,
        category: ContextCategory,
        max_per_operation: Option<u64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            root: root.address,
            address: context_address(root.address, index),
            index,
            category,
            created_at,
            max_per_operation,
            total_committed: 0,
            revoked: false,
        }
    }

    /// Whether the address is the one the deriver produces for `(root, index)`.
    pub fn is_well_formed(&self) -> bool {
        self.address == context_address(self.root, self.index)
    }

    /// Whether `amount` fits under the per-operation ceiling.
    pub fn within_limit(&self, amount: u64) -> bool {
        self.max_per_operation.is_none_or(|limit| amount <= limit)
    }
}
