//! Collaborator ports.
//!
//! Each port owns its error enum. Errors say whether they are transient
//! (timeouts, outages) so callers can retry without guessing; idempotent
//! conditions such as "already exists" get their own variants.

pub mod ledger;
pub mod oracle;
pub mod prover;
