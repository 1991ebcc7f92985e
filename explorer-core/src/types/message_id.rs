use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Decode, Encode, ExplorerProtocolError, MessageIdError, H256};

/// An emitter together with the chain its messages are targeted at. This is
/// the unit sequences are counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emitter {
    /// Chain the emitting contract lives on
    pub chain: u16,
    /// 32 byte emitter address
    pub address: H256,
    /// Chain the messages are meant to be redeemed on
    pub target_chain: u16,
}

impl Emitter {
    /// Message id of sequence `sequence` from this emitter
    pub fn vaa_id(&self, sequence: u64) -> VaaId {
        VaaId {
            emitter_chain: self.chain,
            emitter_address: self.address,
            target_chain: self.target_chain,
            sequence,
        }
    }
}

impl Display for Emitter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.chain,
            hex::encode(self.address.as_bytes()),
            self.target_chain
        )
    }
}

impl Encode for Emitter {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        Ok(self.chain.write_to(writer)?
            + self.address.write_to(writer)?
            + self.target_chain.write_to(writer)?)
    }
}

impl Decode for Emitter {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        Ok(Self {
            chain: u16::read_from(reader)?,
            address: H256::read_from(reader)?,
            target_chain: u16::read_from(reader)?,
        })
    }
}

/// Identity of a signed message, rendered as
/// `emitterChain/emitterAddress/targetChain/sequence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VaaId {
    /// Chain of the emitter
    pub emitter_chain: u16,
    /// Emitter address, 32 bytes
    pub emitter_address: H256,
    /// Target chain
    pub target_chain: u16,
    /// Sequence within the emitter
    pub sequence: u64,
}

impl VaaId {
    /// The emitter part of this id
    pub fn emitter(&self) -> Emitter {
        Emitter {
            chain: self.emitter_chain,
            address: self.emitter_address,
            target_chain: self.target_chain,
        }
    }
}

impl Display for VaaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.emitter(), self.sequence)
    }
}

fn parse_number<T: FromStr>(part: &str) -> Result<T, MessageIdError> {
    // `FromStr` for integers accepts a leading `+`
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MessageIdError::InvalidNumber(part.to_owned()));
    }
    part.parse()
        .map_err(|_| MessageIdError::InvalidNumber(part.to_owned()))
}

impl FromStr for VaaId {
    type Err = MessageIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 4 {
            return Err(MessageIdError::WrongPartCount(parts.len()));
        }
        let address = parts[1];
        if address.len() != 64 {
            return Err(MessageIdError::InvalidEmitterAddress(address.to_owned()));
        }
        let address_bytes = hex::decode(address)
            .map_err(|_| MessageIdError::InvalidEmitterAddress(address.to_owned()))?;

        Ok(Self {
            emitter_chain: parse_number(parts[0])?,
            emitter_address: H256::from_slice(&address_bytes),
            target_chain: parse_number(parts[2])?,
            sequence: parse_number(parts[3])?,
        })
    }
}

impl Serialize for VaaId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VaaId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Encode for VaaId {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        Ok(self.emitter().write_to(writer)? + self.sequence.write_to(writer)?)
    }
}

impl Decode for VaaId {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        let emitter = Emitter::read_from(reader)?;
        Ok(emitter.vaa_id(u64::read_from(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(sequence: u64) -> VaaId {
        VaaId {
            emitter_chain: 2,
            emitter_address: H256::repeat_byte(0xab),
            target_chain: 255,
            sequence,
        }
    }

    #[test]
    fn format_then_parse_is_identity() {
        for sequence in [0, 1, 42, u64::MAX] {
            let original = id(sequence);
            let parsed: VaaId = original.to_string().parse().unwrap();
            assert_eq!(parsed, original);
        }
    }

    #[test]
    fn formats_address_as_64_hex_chars() {
        assert_eq!(id(7).to_string(), format!("2/{}/255/7", "ab".repeat(32)));
    }

    #[test]
    fn parsing_is_strict() {
        let addr = "ab".repeat(32);
        assert_eq!(
            format!("2/{addr}/255").parse::<VaaId>(),
            Err(MessageIdError::WrongPartCount(3))
        );
        assert_eq!(
            format!("2/{addr}/255/7/1").parse::<VaaId>(),
            Err(MessageIdError::WrongPartCount(5))
        );
        assert!(matches!(
            format!("+2/{addr}/255/7").parse::<VaaId>(),
            Err(MessageIdError::InvalidNumber(_))
        ));
        assert!(matches!(
            format!("2/{addr}/70000/7").parse::<VaaId>(),
            Err(MessageIdError::InvalidNumber(_))
        ));
        assert!(matches!(
            "2/abcd/255/7".parse::<VaaId>(),
            Err(MessageIdError::InvalidEmitterAddress(_))
        ));
        assert!(matches!(
            format!("2/{}/255/7", "zz".repeat(32)).parse::<VaaId>(),
            Err(MessageIdError::InvalidEmitterAddress(_))
        ));
    }
}
