//! Interfaces to the guardian network: the authority that publishes guardian
//! sets and the peer nodes that serve signed messages on request.

use std::fmt::Debug;

use async_trait::async_trait;
use auto_impl::auto_impl;

use crate::{ChainResult, Emitter, GuardianSet, VaaBatchEntry};

/// Maximum number of sequences a single batch request may carry.
pub const MAX_VAA_BATCH_SIZE: usize = 20;

/// The authoritative source of guardian sets, typically the core contract on
/// one of the source chains.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait GuardianSetSource: Send + Sync + Debug {
    /// Index of the currently active guardian set
    async fn current_guardian_set_index(&self) -> ChainResult<u32>;

    /// Fetch the guardian set with the given index, `None` if it does not
    /// exist at the source.
    async fn guardian_set(&self, index: u32) -> ChainResult<Option<GuardianSet>>;
}

/// Public RPC of a peer guardian. Responses are sparse: sequences the peer
/// does not have are omitted.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait GuardianRpc: Send + Sync + Debug {
    /// `GetGovernanceVAABatch`
    async fn governance_vaa_batch(&self, sequences: &[u64]) -> ChainResult<Vec<VaaBatchEntry>>;

    /// `GetNonGovernanceVAABatch`
    async fn non_governance_vaa_batch(
        &self,
        emitter: &Emitter,
        sequences: &[u64],
    ) -> ChainResult<Vec<VaaBatchEntry>>;
}
