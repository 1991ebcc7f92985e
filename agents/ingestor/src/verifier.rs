use std::sync::Arc;

use explorer_core::{
    utils::{keccak256, recover_signer},
    Vaa, VerifyError, H160, H256, SIGNATURE_LEN,
};

use crate::guardian_sets::GuardianSetTracker;

/// Prefix of the signed heartbeat digest
pub const HEARTBEAT_PREFIX: &[u8] = b"heartbeat|";

/// Checks messages and gossip envelopes against the tracked guardian sets
#[derive(Debug, Clone)]
pub struct VaaVerifier {
    tracker: Arc<GuardianSetTracker>,
}

impl VaaVerifier {
    /// Verify against the sets known to `tracker`
    pub fn new(tracker: Arc<GuardianSetTracker>) -> Self {
        Self { tracker }
    }

    /// Check that `vaa` carries a quorum of valid signatures of the guardian
    /// set it names.
    pub fn verify(&self, vaa: &Vaa) -> Result<(), VerifyError> {
        let set = self
            .tracker
            .get_by_index(vaa.guardian_set_index)
            .map_err(|_| VerifyError::UnknownGuardianSet(vaa.guardian_set_index))?;
        set.verify(vaa)
    }

    /// Recover the signer of `signature` over `digest` and check it is
    /// `claimed` and a member of the current set.
    pub fn verify_guardian_signature(
        &self,
        digest: &H256,
        signature: &[u8],
        claimed: &H160,
    ) -> Result<(), String> {
        let signature: &[u8; SIGNATURE_LEN] = signature
            .try_into()
            .map_err(|_| format!("signature is {} bytes", signature.len()))?;
        let signer =
            recover_signer(digest, signature).ok_or_else(|| "unrecoverable signature".to_owned())?;
        if signer != *claimed {
            return Err(format!("signed by {signer:?}, claims {claimed:?}"));
        }
        if !self.tracker.current().keys.contains(&signer) {
            return Err(format!("{signer:?} is not in the current guardian set"));
        }
        Ok(())
    }

    /// Digest a heartbeat is signed over
    pub fn heartbeat_digest(heartbeat: &[u8]) -> H256 {
        let mut message = HEARTBEAT_PREFIX.to_vec();
        message.extend_from_slice(heartbeat);
        keccak256(message)
    }
}

#[cfg(test)]
mod test {
    use explorer_base::db::ExplorerDB;
    use explorer_base::CoreMetrics;
    use explorer_core::{GuardianSet, Network};
    use explorer_test::fixtures::{
        guardian_address, guardian_keys, guardian_set, sign_digest, sign_prefixed, VaaBuilder,
    };
    use explorer_test::mocks::MockGuardianSetSource;
    use explorer_test::test_utils::run_test_db;
    use prometheus::Registry;

    use super::*;

    async fn verifier_with(db: explorer_base::db::DB, set: GuardianSet) -> VaaVerifier {
        let mut source = MockGuardianSetSource::new();
        let index = set.index;
        source
            .expect__current_guardian_set_index()
            .returning(move || Ok(index));
        source
            .expect__guardian_set()
            .returning(move |_| Ok(Some(set.clone())));
        let gauge = CoreMetrics::new("test", Registry::new())
            .unwrap()
            .guardian_set_index();
        let tracker = GuardianSetTracker::load(
            ExplorerDB::new(Network::Mainnet, db),
            Network::Mainnet,
            Some(Arc::new(source)),
            gauge,
        )
        .await
        .unwrap();
        VaaVerifier::new(Arc::new(tracker))
    }

    #[tokio::test]
    async fn quorum_of_nineteen_guardians() {
        run_test_db(|db| async move {
            let keys = guardian_keys(19);
            let verifier = verifier_with(db, guardian_set(0, &keys)).await;
            let builder = VaaBuilder::new(2, H256::repeat_byte(7), 255, 0);

            let below = builder.sign_with(&keys, 0..13);
            assert_eq!(
                verifier.verify(&below),
                Err(VerifyError::NoQuorum {
                    signatures: 13,
                    quorum: 14
                })
            );

            let exact = builder.sign_with(&keys, 0..14);
            assert_eq!(verifier.verify(&exact), Ok(()));

            let mut forged = exact.clone();
            forged.signatures[5].signature = sign_digest(&keys[18], &forged.digest());
            assert_eq!(verifier.verify(&forged), Err(VerifyError::BadSignature(5)));
        })
        .await
    }

    #[tokio::test]
    async fn unknown_and_newer_sets_are_rejected() {
        run_test_db(|db| async move {
            let keys = guardian_keys(1);
            let verifier = verifier_with(db, guardian_set(0, &keys)).await;
            let vaa = VaaBuilder::new(2, H256::zero(), 4, u64::MAX)
                .guardian_set_index(1)
                .signed_by(&keys);
            assert_eq!(
                verifier.verify(&vaa),
                Err(VerifyError::UnknownGuardianSet(1))
            );
        })
        .await
    }

    #[tokio::test]
    async fn heartbeat_signatures_must_match_a_current_guardian() {
        run_test_db(|db| async move {
            let keys = guardian_keys(2);
            let verifier = verifier_with(db, guardian_set(0, &keys[..1])).await;
            let heartbeat = b"heartbeat body";
            let digest = VaaVerifier::heartbeat_digest(heartbeat);

            let good = sign_prefixed(&keys[0], HEARTBEAT_PREFIX, heartbeat);
            assert!(verifier
                .verify_guardian_signature(&digest, &good, &guardian_address(&keys[0]))
                .is_ok());

            let outsider = sign_prefixed(&keys[1], HEARTBEAT_PREFIX, heartbeat);
            assert!(verifier
                .verify_guardian_signature(&digest, &outsider, &guardian_address(&keys[1]))
                .is_err());
            assert!(verifier
                .verify_guardian_signature(&digest, &good, &guardian_address(&keys[1]))
                .is_err());
        })
        .await
    }
}
