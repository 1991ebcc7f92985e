//! Typed application payloads carried by messages.
//!
//! Token and NFT bridge payloads are dispatched on their first byte, while
//! governance payloads start with a 32 byte module name followed by an
//! action byte.

use std::io::{Cursor, Read};

use serde::Deserialize;

use crate::{Decode, Encode, ExplorerProtocolError, PayloadError, H160, H256, U256};

/// Control bytes stripped from the ends of fixed width text fields.
const TRIMMED_CHARS: [char; 5] = ['\u{0}', '\u{2}', '\u{6}', '\u{9}', '\u{12}'];

/// What kind of application an emitter is, which decides how its payloads
/// are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmitterKind {
    /// The governance emitter
    Governance,
    /// A token bridge contract
    TokenBridge,
    /// An NFT bridge contract
    NftBridge,
}

/// Payload id of a token transfer
pub const TOKEN_TRANSFER_ID: u8 = 1;
/// Payload id of an asset registration
pub const ASSET_META_ID: u8 = 2;
/// Payload id of an NFT transfer
pub const NFT_TRANSFER_ID: u8 = 1;

/// A decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Fungible token transfer
    TokenTransfer(TokenTransfer),
    /// Token metadata attestation
    AssetMeta(AssetMeta),
    /// NFT transfer
    NftTransfer(NftTransfer),
    /// Governance instruction
    Governance(GovernanceAction),
}

/// `amount ‖ originAddress ‖ originChain ‖ targetAddressSize ‖ targetAddress`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    /// Amount in the token's smallest unit
    pub amount: U256,
    /// Token address on its origin chain
    pub origin_address: H256,
    /// Origin chain of the token
    pub origin_chain: u16,
    /// Recipient, in the target chain's native length
    pub target_address: Vec<u8>,
}

/// Token metadata published by a token bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMeta {
    /// Token address on its native chain
    pub token_address: H256,
    /// Native chain of the token
    pub token_chain: u16,
    /// Decimals
    pub decimals: u8,
    /// Symbol with padding removed
    pub symbol: String,
    /// Name with padding removed
    pub name: String,
}

/// An NFT transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftTransfer {
    /// Collection address on its origin chain
    pub origin_address: H256,
    /// Origin chain of the collection
    pub origin_chain: u16,
    /// Collection symbol
    pub symbol: String,
    /// Collection name
    pub name: String,
    /// Token id
    pub token_id: U256,
    /// Metadata uri
    pub uri: String,
    /// Recipient
    pub target_address: H256,
}

/// Modules that can be governed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernanceModule {
    /// The core messaging contract
    Core,
    /// The token bridge
    TokenBridge,
}

impl GovernanceModule {
    fn from_padded(bytes: &[u8; 32]) -> Option<Self> {
        let name = bytes.iter().skip_while(|b| **b == 0).copied().collect::<Vec<_>>();
        match name.as_slice() {
            b"Core" => Some(Self::Core),
            b"TokenBridge" => Some(Self::TokenBridge),
            _ => None,
        }
    }
}

/// A governance instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceAction {
    /// Governed module
    pub module: GovernanceModule,
    /// Chain the instruction applies to, 0 for all
    pub chain: u16,
    /// The instruction itself
    pub instruction: GovernanceInstruction,
}

/// Governance instructions, by module and action code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernanceInstruction {
    /// Core action 1
    ContractUpgrade {
        /// New contract code
        code: Vec<u8>,
    },
    /// Core action 2
    GuardianSetUpgrade {
        /// Index of the new set
        new_index: u32,
        /// Guardian addresses of the new set
        keys: Vec<H160>,
    },
    /// Core action 3
    UpdateMessageFee {
        /// New fee
        fee: U256,
    },
    /// Core action 4
    TransferFee {
        /// Amount
        amount: U256,
        /// Recipient
        recipient: H256,
    },
    /// Token bridge action 1
    RegisterChain {
        /// Chain of the registered bridge
        emitter_chain: u16,
        /// Address of the registered bridge
        emitter_address: H256,
    },
    /// Token bridge action 2
    UpgradeContract {
        /// New contract code
        code: Vec<u8>,
    },
    /// Token bridge action 0xF0
    DestroyUnexecutedSequences {
        /// Emitter chain of the sequences
        emitter_chain: u16,
        /// Sequences whose contracts are destroyed
        sequences: Vec<u64>,
    },
    /// Token bridge action 0xF1
    UpdateMinimalConsistencyLevel {
        /// New minimal consistency level
        level: u8,
    },
    /// Token bridge action 0xF2
    UpdateRefundAddress {
        /// New refund address
        address: Vec<u8>,
    },
}

/// Strip padding control characters from a fixed width text field. NULs
/// are dropped wherever they appear.
pub fn trim_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(&TRIMMED_CHARS[..])
        .replace('\u{0}', "")
}

fn malformed(err: ExplorerProtocolError) -> PayloadError {
    PayloadError::Malformed(err.to_string())
}

fn read_array<const N: usize>(reader: &mut Cursor<&[u8]>) -> Result<[u8; N], PayloadError> {
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .map_err(|e| malformed(e.into()))?;
    Ok(buf)
}

fn read_vec(reader: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>, PayloadError> {
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|e| malformed(e.into()))?;
    Ok(buf)
}

fn read<T: Decode>(reader: &mut Cursor<&[u8]>) -> Result<T, PayloadError> {
    T::read_from(reader).map_err(malformed)
}

fn remaining(reader: &mut Cursor<&[u8]>) -> Vec<u8> {
    let start = reader.position() as usize;
    let bytes = &reader.get_ref()[start..];
    reader.set_position(reader.get_ref().len() as u64);
    bytes.to_vec()
}

fn ensure_consumed(reader: &Cursor<&[u8]>) -> Result<(), PayloadError> {
    let extra = reader.get_ref().len() as u64 - reader.position();
    if extra != 0 {
        return Err(PayloadError::Malformed(format!("{extra} trailing bytes")));
    }
    Ok(())
}

/// Decode a payload from an emitter of the given kind.
pub fn decode_payload(kind: EmitterKind, payload: &[u8]) -> Result<Payload, PayloadError> {
    let mut reader = Cursor::new(payload);
    let decoded = match kind {
        EmitterKind::Governance => Payload::Governance(decode_governance(&mut reader)?),
        EmitterKind::TokenBridge => match read::<u8>(&mut reader)? {
            TOKEN_TRANSFER_ID => Payload::TokenTransfer(TokenTransfer::read_fields(&mut reader)?),
            ASSET_META_ID => Payload::AssetMeta(AssetMeta::read_fields(&mut reader)?),
            other => return Err(PayloadError::UnsupportedPayload(other)),
        },
        EmitterKind::NftBridge => match read::<u8>(&mut reader)? {
            NFT_TRANSFER_ID => Payload::NftTransfer(NftTransfer::read_fields(&mut reader)?),
            other => return Err(PayloadError::UnsupportedPayload(other)),
        },
    };
    ensure_consumed(&reader)?;
    Ok(decoded)
}

impl TokenTransfer {
    fn read_fields(reader: &mut Cursor<&[u8]>) -> Result<Self, PayloadError> {
        let amount = read::<U256>(reader)?;
        let origin_address = read::<H256>(reader)?;
        let origin_chain = read::<u16>(reader)?;
        let size = read::<u16>(reader)?;
        let target_address = read_vec(reader, size as usize)?;
        Ok(Self {
            amount,
            origin_address,
            origin_chain,
            target_address,
        })
    }
}

impl Encode for TokenTransfer {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        let mut written = TOKEN_TRANSFER_ID.write_to(writer)?;
        written += self.amount.write_to(writer)?;
        written += self.origin_address.write_to(writer)?;
        written += self.origin_chain.write_to(writer)?;
        written += (self.target_address.len() as u16).write_to(writer)?;
        writer.write_all(&self.target_address)?;
        Ok(written + self.target_address.len())
    }
}

impl AssetMeta {
    fn read_fields(reader: &mut Cursor<&[u8]>) -> Result<Self, PayloadError> {
        Ok(Self {
            token_address: read(reader)?,
            token_chain: read(reader)?,
            decimals: read(reader)?,
            symbol: trim_text(&read_array::<32>(reader)?),
            name: trim_text(&read_array::<32>(reader)?),
        })
    }
}

impl NftTransfer {
    fn read_fields(reader: &mut Cursor<&[u8]>) -> Result<Self, PayloadError> {
        let origin_address = read(reader)?;
        let origin_chain = read(reader)?;
        let symbol = trim_text(&read_array::<32>(reader)?);
        let name = trim_text(&read_array::<32>(reader)?);
        let token_id = read(reader)?;
        let uri_len = read::<u8>(reader)?;
        let uri = trim_text(&read_vec(reader, uri_len as usize)?);
        let target_address = read(reader)?;
        Ok(Self {
            origin_address,
            origin_chain,
            symbol,
            name,
            token_id,
            uri,
            target_address,
        })
    }
}

fn decode_governance(reader: &mut Cursor<&[u8]>) -> Result<GovernanceAction, PayloadError> {
    let module_bytes = read_array::<32>(reader)?;
    let module = GovernanceModule::from_padded(&module_bytes)
        .ok_or_else(|| PayloadError::Malformed("unknown governance module".into()))?;
    let action = read::<u8>(reader)?;
    let chain = read::<u16>(reader)?;

    let instruction = match (module, action) {
        (GovernanceModule::Core, 1) => GovernanceInstruction::ContractUpgrade {
            code: remaining(reader),
        },
        (GovernanceModule::Core, 2) => {
            let new_index = read::<u32>(reader)?;
            let count = read::<u8>(reader)?;
            let keys = (0..count)
                .map(|_| read::<H160>(reader))
                .collect::<Result<Vec<_>, _>>()?;
            GovernanceInstruction::GuardianSetUpgrade { new_index, keys }
        }
        (GovernanceModule::Core, 3) => GovernanceInstruction::UpdateMessageFee {
            fee: read(reader)?,
        },
        (GovernanceModule::Core, 4) => GovernanceInstruction::TransferFee {
            amount: read(reader)?,
            recipient: read(reader)?,
        },
        (GovernanceModule::TokenBridge, 1) => GovernanceInstruction::RegisterChain {
            emitter_chain: read(reader)?,
            emitter_address: read(reader)?,
        },
        (GovernanceModule::TokenBridge, 2) => GovernanceInstruction::UpgradeContract {
            code: remaining(reader),
        },
        (GovernanceModule::TokenBridge, 0xf0) => {
            let emitter_chain = read::<u16>(reader)?;
            let count = read::<u16>(reader)?;
            let sequences = (0..count)
                .map(|_| read::<u64>(reader))
                .collect::<Result<Vec<_>, _>>()?;
            GovernanceInstruction::DestroyUnexecutedSequences {
                emitter_chain,
                sequences,
            }
        }
        (GovernanceModule::TokenBridge, 0xf1) => {
            GovernanceInstruction::UpdateMinimalConsistencyLevel {
                level: read(reader)?,
            }
        }
        (GovernanceModule::TokenBridge, 0xf2) => {
            let size = read::<u16>(reader)?;
            GovernanceInstruction::UpdateRefundAddress {
                address: read_vec(reader, size as usize)?,
            }
        }
        (_, other) => return Err(PayloadError::UnsupportedPayload(other)),
    };

    Ok(GovernanceAction {
        module,
        chain,
        instruction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(text: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[32 - text.len()..].copy_from_slice(text);
        out
    }

    fn transfer() -> TokenTransfer {
        TokenTransfer {
            amount: U256::MAX,
            origin_address: H256::repeat_byte(3),
            origin_chain: 2,
            target_address: vec![9; 20],
        }
    }

    #[test]
    fn token_transfer_reencodes_byte_identical() {
        let bytes = transfer().to_vec();
        let decoded = decode_payload(EmitterKind::TokenBridge, &bytes).unwrap();
        let Payload::TokenTransfer(decoded) = decoded else {
            panic!("expected a token transfer");
        };
        assert_eq!(decoded.amount, U256::MAX);
        assert_eq!(decoded.to_vec(), bytes);
    }

    #[test]
    fn id_only_payloads_are_malformed() {
        assert!(matches!(
            decode_payload(EmitterKind::TokenBridge, &[TOKEN_TRANSFER_ID]),
            Err(PayloadError::Malformed(_))
        ));
        assert!(matches!(
            decode_payload(EmitterKind::TokenBridge, &[ASSET_META_ID]),
            Err(PayloadError::Malformed(_))
        ));
        assert!(matches!(
            decode_payload(EmitterKind::NftBridge, &[NFT_TRANSFER_ID]),
            Err(PayloadError::Malformed(_))
        ));
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        let mut bytes = transfer().to_vec();
        bytes.push(0);
        assert!(matches!(
            decode_payload(EmitterKind::TokenBridge, &bytes),
            Err(PayloadError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_ids_are_unsupported() {
        assert_eq!(
            decode_payload(EmitterKind::TokenBridge, &[7, 0, 0]),
            Err(PayloadError::UnsupportedPayload(7))
        );
    }

    #[test]
    fn asset_meta_text_is_trimmed() {
        let mut bytes = vec![ASSET_META_ID];
        bytes.extend_from_slice(&[4u8; 32]);
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.push(18);
        let mut symbol = [0u8; 32];
        symbol[..5].copy_from_slice(b"\x02WETH");
        bytes.extend_from_slice(&symbol);
        bytes.extend_from_slice(&padded(b"Wrapped Ether\x12"));

        let Payload::AssetMeta(meta) = decode_payload(EmitterKind::TokenBridge, &bytes).unwrap()
        else {
            panic!("expected asset meta");
        };
        assert_eq!(meta.symbol, "WETH");
        assert_eq!(meta.name, "Wrapped Ether");
        assert_eq!(meta.decimals, 18);
        assert_eq!(meta.token_chain, 2);
    }

    #[test]
    fn embedded_nuls_are_dropped() {
        assert_eq!(trim_text(b"\x00US\x00DC\x00\x00"), "USDC");
        assert_eq!(trim_text(b"\x02a\x06b\x12"), "a\u{6}b");
    }

    #[test]
    fn nft_transfer_decodes() {
        let mut bytes = vec![NFT_TRANSFER_ID];
        bytes.extend_from_slice(&[1u8; 32]);
        bytes.extend_from_slice(&4u16.to_be_bytes());
        bytes.extend_from_slice(&padded(b"APE"));
        bytes.extend_from_slice(&padded(b"Apes"));
        let mut token_id = [0u8; 32];
        U256::from(77).to_big_endian(&mut token_id);
        bytes.extend_from_slice(&token_id);
        bytes.push(9);
        bytes.extend_from_slice(b"ipfs://ab");
        bytes.extend_from_slice(&[2u8; 32]);

        let Payload::NftTransfer(nft) = decode_payload(EmitterKind::NftBridge, &bytes).unwrap()
        else {
            panic!("expected an nft transfer");
        };
        assert_eq!(nft.token_id, U256::from(77));
        assert_eq!(nft.uri, "ipfs://ab");
        assert_eq!(nft.symbol, "APE");
        assert_eq!(nft.target_address, H256::repeat_byte(2));
    }

    #[test]
    fn guardian_set_upgrade_decodes() {
        let mut bytes = padded(b"Core").to_vec();
        bytes.push(2);
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.push(2);
        bytes.extend_from_slice(&[0xaa; 20]);
        bytes.extend_from_slice(&[0xbb; 20]);

        let decoded = decode_payload(EmitterKind::Governance, &bytes).unwrap();
        assert_eq!(
            decoded,
            Payload::Governance(GovernanceAction {
                module: GovernanceModule::Core,
                chain: 0,
                instruction: GovernanceInstruction::GuardianSetUpgrade {
                    new_index: 1,
                    keys: vec![H160::repeat_byte(0xaa), H160::repeat_byte(0xbb)],
                },
            })
        );
    }

    #[test]
    fn destroy_unexecuted_sequences_decodes() {
        let mut bytes = padded(b"TokenBridge").to_vec();
        bytes.push(0xf0);
        bytes.extend_from_slice(&255u16.to_be_bytes());
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&5u64.to_be_bytes());
        bytes.extend_from_slice(&6u64.to_be_bytes());

        let Payload::Governance(action) = decode_payload(EmitterKind::Governance, &bytes).unwrap()
        else {
            panic!("expected governance");
        };
        assert_eq!(action.chain, 255);
        assert_eq!(
            action.instruction,
            GovernanceInstruction::DestroyUnexecutedSequences {
                emitter_chain: 2,
                sequences: vec![5, 6],
            }
        );
    }

    #[test]
    fn unknown_governance_module_is_malformed() {
        let mut bytes = padded(b"Nope").to_vec();
        bytes.extend_from_slice(&[1, 0, 0]);
        assert!(matches!(
            decode_payload(EmitterKind::Governance, &bytes),
            Err(PayloadError::Malformed(_))
        ));
    }
}
