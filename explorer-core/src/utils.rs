use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::{H160, H256};

/// keccak256 of `data`
pub fn keccak256(data: impl AsRef<[u8]>) -> H256 {
    H256::from_slice(Keccak256::digest(data.as_ref()).as_slice())
}

/// Ethereum style address of a secp256k1 public key: the last 20 bytes of the
/// keccak hash of the uncompressed point without its tag byte.
pub fn address_of(key: &VerifyingKey) -> H160 {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    H160::from_slice(&hash.as_bytes()[12..])
}

/// Recover the signer address of a 65 byte `r ‖ s ‖ v` signature over a
/// prehashed digest. Returns `None` if the signature is not recoverable.
pub fn recover_signer(digest: &H256, signature: &[u8; 65]) -> Option<H160> {
    let sig = Signature::from_slice(&signature[..64]).ok()?;
    let recovery_id = RecoveryId::from_byte(signature[64])?;
    VerifyingKey::recover_from_prehash(digest.as_bytes(), &sig, recovery_id)
        .ok()
        .map(|key| address_of(&key))
}

/// Parse a `0x` prefixed or bare hex string into a 32 byte value, left
/// padding shorter inputs (e.g. 20 byte EVM addresses).
pub fn hex_to_h256(input: &str) -> Option<H256> {
    let bytes = hex::decode(input.trim_start_matches("0x")).ok()?;
    if bytes.len() > 32 {
        return None;
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Some(H256::from(out))
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::SigningKey;

    use super::*;

    #[test]
    fn recovers_the_signing_address() {
        let key = SigningKey::from_slice(&[7u8; 32]).unwrap();
        let digest = keccak256(b"hello");
        let (sig, recid) = key.sign_prehash_recoverable(digest.as_bytes()).unwrap();
        let mut raw = [0u8; 65];
        raw[..64].copy_from_slice(&sig.to_bytes());
        raw[64] = recid.to_byte();

        let expected = address_of(key.verifying_key());
        assert_eq!(recover_signer(&digest, &raw), Some(expected));
    }

    #[test]
    fn garbage_signatures_do_not_recover() {
        assert_eq!(recover_signer(&keccak256(b"x"), &[0u8; 65]), None);
    }

    #[test]
    fn pads_short_hex_to_32_bytes() {
        let h = hex_to_h256("0x0102").unwrap();
        assert_eq!(&h.as_bytes()[30..], &[1, 2]);
        assert!(hex_to_h256(&"ff".repeat(33)).is_none());
    }
}
