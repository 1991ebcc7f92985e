#![allow(non_snake_case)]
#![allow(missing_docs)]

use async_trait::async_trait;
use mockall::*;

use explorer_core::*;

mock! {
    pub GuardianRpc {
        pub fn _governance_vaa_batch(&self, sequences: &[u64]) -> ChainResult<Vec<VaaBatchEntry>> {}

        pub fn _non_governance_vaa_batch(
            &self,
            emitter: &Emitter,
            sequences: &[u64],
        ) -> ChainResult<Vec<VaaBatchEntry>> {}
    }
}

impl std::fmt::Debug for MockGuardianRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGuardianRpc")
    }
}

#[async_trait]
impl GuardianRpc for MockGuardianRpc {
    async fn governance_vaa_batch(&self, sequences: &[u64]) -> ChainResult<Vec<VaaBatchEntry>> {
        self._governance_vaa_batch(sequences)
    }

    async fn non_governance_vaa_batch(
        &self,
        emitter: &Emitter,
        sequences: &[u64],
    ) -> ChainResult<Vec<VaaBatchEntry>> {
        self._non_governance_vaa_batch(emitter, sequences)
    }
}

mock! {
    pub GuardianSetSource {
        pub fn _current_guardian_set_index(&self) -> ChainResult<u32> {}

        pub fn _guardian_set(&self, index: u32) -> ChainResult<Option<GuardianSet>> {}
    }
}

impl std::fmt::Debug for MockGuardianSetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGuardianSetSource")
    }
}

#[async_trait]
impl GuardianSetSource for MockGuardianSetSource {
    async fn current_guardian_set_index(&self) -> ChainResult<u32> {
        self._current_guardian_set_index()
    }

    async fn guardian_set(&self, index: u32) -> ChainResult<Option<GuardianSet>> {
        self._guardian_set(index)
    }
}
