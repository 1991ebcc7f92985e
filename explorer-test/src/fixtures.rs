use k256::ecdsa::SigningKey;

use explorer_core::{
    utils::{address_of, keccak256},
    Encode, GuardianSet, GuardianSignature, Vaa, VaaBody, H160, H256, SIGNATURE_LEN, VAA_VERSION,
};

/// `n` deterministic guardian keys
pub fn guardian_keys(n: usize) -> Vec<SigningKey> {
    (0..n)
        .map(|i| {
            let mut secret = [0x11u8; 32];
            secret[31] = i as u8 + 1;
            SigningKey::from_slice(&secret).expect("valid secret")
        })
        .collect()
}

/// Address of a guardian key
pub fn guardian_address(key: &SigningKey) -> H160 {
    address_of(key.verifying_key())
}

/// Guardian set made of `keys`, in order
pub fn guardian_set(index: u32, keys: &[SigningKey]) -> GuardianSet {
    GuardianSet::new(index, keys.iter().map(guardian_address).collect())
}

/// Recoverable `r ‖ s ‖ v` signature over a prehashed digest
pub fn sign_digest(key: &SigningKey, digest: &H256) -> [u8; SIGNATURE_LEN] {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest.as_bytes())
        .expect("signing a 32 byte prehash");
    let mut raw = [0u8; SIGNATURE_LEN];
    raw[..64].copy_from_slice(&signature.to_bytes());
    raw[64] = recovery_id.to_byte();
    raw
}

/// Signature over `keccak256(prefix ‖ data)`, the scheme of gossip
/// envelopes such as heartbeats
pub fn sign_prefixed(key: &SigningKey, prefix: &[u8], data: &[u8]) -> [u8; SIGNATURE_LEN] {
    let mut message = prefix.to_vec();
    message.extend_from_slice(data);
    sign_digest(key, &keccak256(message))
}

/// Builds signed messages
#[derive(Debug, Clone)]
pub struct VaaBuilder {
    guardian_set_index: u32,
    body: VaaBody,
}

impl VaaBuilder {
    /// A message of `(emitter_chain, emitter_address, target_chain, sequence)`
    /// with an empty payload
    pub fn new(
        emitter_chain: u16,
        emitter_address: H256,
        target_chain: u16,
        sequence: u64,
    ) -> Self {
        Self {
            guardian_set_index: 0,
            body: VaaBody {
                timestamp: 1_700_000_000,
                nonce: 0,
                emitter_chain,
                target_chain,
                emitter_address,
                sequence,
                consistency_level: 1,
                payload: vec![],
            },
        }
    }

    /// Set the guardian set index
    pub fn guardian_set_index(mut self, index: u32) -> Self {
        self.guardian_set_index = index;
        self
    }

    /// Set the payload
    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.body.payload = payload.into();
        self
    }

    /// Set the timestamp, in seconds
    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.body.timestamp = timestamp;
        self
    }

    /// Set the requested consistency level
    pub fn consistency_level(mut self, level: u8) -> Self {
        self.body.consistency_level = level;
        self
    }

    /// Sign with the guardians at `indices` of `keys`
    pub fn sign_with(&self, keys: &[SigningKey], indices: impl IntoIterator<Item = u8>) -> Vaa {
        let digest = self.body.digest();
        let signatures = indices
            .into_iter()
            .map(|index| GuardianSignature {
                index,
                signature: sign_digest(&keys[index as usize], &digest),
            })
            .collect();
        Vaa {
            version: VAA_VERSION,
            guardian_set_index: self.guardian_set_index,
            signatures,
            body: self.body.clone(),
        }
    }

    /// Sign with every key
    pub fn signed_by(&self, keys: &[SigningKey]) -> Vaa {
        self.sign_with(keys, 0..keys.len() as u8)
    }

    /// Wire bytes signed by every key
    pub fn bytes(&self, keys: &[SigningKey]) -> Vec<u8> {
        self.signed_by(keys).to_vec()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn built_messages_verify_and_parse() {
        let keys = guardian_keys(4);
        let set = guardian_set(0, &keys);
        let builder = VaaBuilder::new(2, H256::repeat_byte(1), 255, 9).payload(vec![1, 2, 3]);
        let vaa = builder.signed_by(&keys);
        assert_eq!(set.verify(&vaa), Ok(()));
        assert_eq!(Vaa::parse(&builder.bytes(&keys)).unwrap(), vaa);
    }
}
