use derive_new::new;

use crate::utils::recover_signer;
use crate::{Decode, Encode, ExplorerProtocolError, Vaa, VerifyError, H160};

/// An indexed, immutable set of guardian addresses.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct GuardianSet {
    /// Monotonic index of this set
    pub index: u32,
    /// Guardian addresses, in signing order
    pub keys: Vec<H160>,
}

/// Signatures required out of `n` guardians: `⌈2n/3⌉ + 1`, capped at `n`
/// so that a single guardian network can reach quorum.
pub fn quorum(n: usize) -> usize {
    ((2 * n).div_ceil(3) + 1).min(n)
}

impl GuardianSet {
    /// Number of signatures a message needs to be admitted
    pub fn quorum(&self) -> usize {
        quorum(self.keys.len())
    }

    /// Check that `vaa` carries a quorum of valid signatures from this set.
    ///
    /// Signature indices must be strictly increasing so that a single
    /// guardian cannot be counted twice.
    pub fn verify(&self, vaa: &Vaa) -> Result<(), VerifyError> {
        if vaa.guardian_set_index != self.index {
            return Err(VerifyError::UnknownGuardianSet(vaa.guardian_set_index));
        }
        let quorum = self.quorum();
        if vaa.signatures.len() < quorum {
            return Err(VerifyError::NoQuorum {
                signatures: vaa.signatures.len(),
                quorum,
            });
        }

        let digest = vaa.digest();
        let mut last_index: Option<u8> = None;
        for sig in &vaa.signatures {
            if last_index.is_some_and(|last| sig.index <= last) {
                return Err(VerifyError::BadSignature(sig.index));
            }
            last_index = Some(sig.index);

            let expected = self
                .keys
                .get(sig.index as usize)
                .ok_or(VerifyError::BadSignature(sig.index))?;
            match recover_signer(&digest, &sig.signature) {
                Some(signer) if signer == *expected => {}
                _ => return Err(VerifyError::BadSignature(sig.index)),
            }
        }
        Ok(())
    }
}

impl Encode for GuardianSet {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        Ok(self.index.write_to(writer)? + self.keys.write_to(writer)?)
    }
}

impl Decode for GuardianSet {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        Ok(Self {
            index: u32::read_from(reader)?,
            keys: Vec::<H160>::read_from(reader)?,
        })
    }
}
