use std::io::Cursor;
use std::ops::Deref;

use crate::utils::keccak256;
use crate::{Decode, Encode, ExplorerProtocolError, VaaError, VaaId, H256};

/// The only wire version this explorer understands
pub const VAA_VERSION: u8 = 1;
/// Length of a recoverable secp256k1 signature, `r ‖ s ‖ v`
pub const SIGNATURE_LEN: usize = 65;
/// Length of the fixed part of a message body
pub const BODY_HEADER_LEN: usize = 4 + 4 + 2 + 2 + 32 + 8 + 1;

/// A single guardian's signature over a message digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardianSignature {
    /// Position of the guardian in its set
    pub index: u8,
    /// Recoverable signature
    pub signature: [u8; SIGNATURE_LEN],
}

impl Encode for GuardianSignature {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        writer.write_all(&[self.index])?;
        writer.write_all(&self.signature)?;
        Ok(1 + SIGNATURE_LEN)
    }
}

impl Decode for GuardianSignature {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        let index = u8::read_from(reader)?;
        let mut signature = [0; SIGNATURE_LEN];
        reader.read_exact(&mut signature)?;
        Ok(Self { index, signature })
    }
}

/// The signed part of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaaBody {
    /// Seconds since epoch of the source chain block
    pub timestamp: u32,
    /// Nonce chosen by the emitter
    pub nonce: u32,
    /// Chain of the emitter
    pub emitter_chain: u16,
    /// Chain the message is meant for
    pub target_chain: u16,
    /// Emitter contract, padded to 32 bytes
    pub emitter_address: H256,
    /// Sequence of the message within its emitter
    pub sequence: u64,
    /// Requested confirmation depth
    pub consistency_level: u8,
    /// Application payload
    pub payload: Vec<u8>,
}

impl VaaBody {
    /// keccak256(keccak256(body)); the prehash guardians sign.
    pub fn digest(&self) -> H256 {
        keccak256(keccak256(self.to_vec()))
    }

    /// Id of this message
    pub fn id(&self) -> VaaId {
        VaaId {
            emitter_chain: self.emitter_chain,
            emitter_address: self.emitter_address,
            target_chain: self.target_chain,
            sequence: self.sequence,
        }
    }

    fn read_body(bytes: &[u8]) -> Result<Self, ExplorerProtocolError> {
        let mut reader = Cursor::new(bytes);
        let timestamp = u32::read_from(&mut reader)?;
        let nonce = u32::read_from(&mut reader)?;
        let emitter_chain = u16::read_from(&mut reader)?;
        let target_chain = u16::read_from(&mut reader)?;
        let emitter_address = H256::read_from(&mut reader)?;
        let sequence = u64::read_from(&mut reader)?;
        let consistency_level = u8::read_from(&mut reader)?;
        let payload = bytes[reader.position() as usize..].to_vec();
        Ok(Self {
            timestamp,
            nonce,
            emitter_chain,
            target_chain,
            emitter_address,
            sequence,
            consistency_level,
            payload,
        })
    }
}

impl Encode for VaaBody {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        let mut written = self.timestamp.write_to(writer)?;
        written += self.nonce.write_to(writer)?;
        written += self.emitter_chain.write_to(writer)?;
        written += self.target_chain.write_to(writer)?;
        written += self.emitter_address.write_to(writer)?;
        written += self.sequence.write_to(writer)?;
        written += self.consistency_level.write_to(writer)?;
        writer.write_all(&self.payload)?;
        Ok(written + self.payload.len())
    }
}

/// A Verifiable Action Approval: a message body with the guardian signatures
/// attesting to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vaa {
    /// Wire version
    pub version: u8,
    /// Guardian set the signatures belong to
    pub guardian_set_index: u32,
    /// Signatures, ordered by guardian index
    pub signatures: Vec<GuardianSignature>,
    /// Signed body
    pub body: VaaBody,
}

impl Deref for Vaa {
    type Target = VaaBody;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

impl Vaa {
    /// Parse the wire format
    /// `version ‖ guardianSetIndex ‖ sigCount ‖ signatures ‖ body`.
    pub fn parse(bytes: &[u8]) -> Result<Self, VaaError> {
        let malformed = |e: ExplorerProtocolError| VaaError::MalformedVaa(e.to_string());

        let mut reader = Cursor::new(bytes);
        let version = u8::read_from(&mut reader).map_err(malformed)?;
        if version != VAA_VERSION {
            return Err(VaaError::MalformedVaa(format!(
                "unsupported version {version}"
            )));
        }
        let guardian_set_index = u32::read_from(&mut reader).map_err(malformed)?;
        let sig_count = u8::read_from(&mut reader).map_err(malformed)?;
        let signatures = (0..sig_count)
            .map(|_| GuardianSignature::read_from(&mut reader))
            .collect::<Result<Vec<_>, _>>()
            .map_err(malformed)?;

        let body_bytes = &bytes[reader.position() as usize..];
        if body_bytes.len() < BODY_HEADER_LEN {
            return Err(VaaError::MalformedVaa(format!(
                "body is {} bytes, expected at least {BODY_HEADER_LEN}",
                body_bytes.len()
            )));
        }
        let body = VaaBody::read_body(body_bytes).map_err(malformed)?;

        Ok(Self {
            version,
            guardian_set_index,
            signatures,
            body,
        })
    }
}

impl Encode for Vaa {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        let mut written = self.version.write_to(writer)?;
        written += self.guardian_set_index.write_to(writer)?;
        written += (self.signatures.len() as u8).write_to(writer)?;
        for signature in &self.signatures {
            written += signature.write_to(writer)?;
        }
        Ok(written + self.body.write_to(writer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> VaaBody {
        VaaBody {
            timestamp: 1_700_000_000,
            nonce: 9,
            emitter_chain: 2,
            target_chain: 255,
            emitter_address: H256::repeat_byte(1),
            sequence: u64::MAX,
            consistency_level: 15,
            payload: vec![1, 2, 3],
        }
    }

    #[test]
    fn body_layout_is_big_endian_and_packed() {
        let bytes = body().to_vec();
        assert_eq!(bytes.len(), BODY_HEADER_LEN + 3);
        assert_eq!(&bytes[..4], &1_700_000_000u32.to_be_bytes());
        assert_eq!(&bytes[8..10], &2u16.to_be_bytes());
        assert_eq!(&bytes[10..12], &255u16.to_be_bytes());
        assert_eq!(&bytes[44..52], &u64::MAX.to_be_bytes());
        assert_eq!(bytes[52], 15);
    }

    #[test]
    fn parses_what_it_marshals() {
        let vaa = Vaa {
            version: 1,
            guardian_set_index: 3,
            signatures: vec![GuardianSignature {
                index: 0,
                signature: [5; SIGNATURE_LEN],
            }],
            body: body(),
        };
        let bytes = vaa.to_vec();
        assert_eq!(bytes.len(), 6 + 66 + BODY_HEADER_LEN + 3);
        assert_eq!(Vaa::parse(&bytes).unwrap(), vaa);
    }

    #[test]
    fn rejects_truncated_input() {
        let vaa = Vaa {
            version: 1,
            guardian_set_index: 0,
            signatures: vec![],
            body: body(),
        };
        let bytes = vaa.to_vec();
        assert!(matches!(
            Vaa::parse(&bytes[..20]),
            Err(VaaError::MalformedVaa(_))
        ));
        assert!(matches!(Vaa::parse(&[]), Err(VaaError::MalformedVaa(_))));
    }

    #[test]
    fn rejects_unknown_versions() {
        let mut bytes = Vaa {
            version: 1,
            guardian_set_index: 0,
            signatures: vec![],
            body: body(),
        }
        .to_vec();
        bytes[0] = 2;
        assert!(Vaa::parse(&bytes).is_err());
    }
}
