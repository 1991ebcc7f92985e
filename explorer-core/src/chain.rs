use std::fmt::{Display, Formatter};

use serde::Deserialize;
use strum::{AsRefStr, Display as StrumDisplay, EnumString, FromRepr};

use crate::H256;

/// Chains the explorer has first class knowledge of. Any other chain id is
/// still accepted on the wire and formatted with the raw address form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, EnumString, AsRefStr, StrumDisplay,
)]
#[repr(u16)]
#[strum(serialize_all = "lowercase")]
#[allow(missing_docs)]
pub enum KnownChain {
    Solana = 1,
    Ethereum = 2,
    Terra = 3,
    Bsc = 4,
    Polygon = 5,
    Avalanche = 6,
    Alephium = 255,
}

/// How addresses of a chain are rendered in their native form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFormat {
    /// Last 20 bytes, `0x` prefixed
    Evm,
    /// base58 of `0x00 ‖ address`
    Base58,
    /// The full 32 bytes as hex
    Raw,
}

impl KnownChain {
    /// Chain id on the wire
    pub fn id(self) -> u16 {
        self as u16
    }

    /// The native address representation of this chain
    pub fn address_format(self) -> AddressFormat {
        match self {
            KnownChain::Ethereum
            | KnownChain::Bsc
            | KnownChain::Polygon
            | KnownChain::Avalanche => AddressFormat::Evm,
            KnownChain::Alephium => AddressFormat::Base58,
            KnownChain::Solana | KnownChain::Terra => AddressFormat::Raw,
        }
    }
}

/// Render a 32 byte bridge address in the native form of `chain`.
pub fn normalize_address(chain: u16, address: &H256) -> String {
    let format = KnownChain::from_repr(chain)
        .map(KnownChain::address_format)
        .unwrap_or(AddressFormat::Raw);
    match format {
        AddressFormat::Evm => format!("0x{}", hex::encode(&address.as_bytes()[12..])),
        AddressFormat::Base58 => {
            let mut bytes = Vec::with_capacity(33);
            bytes.push(0u8);
            bytes.extend_from_slice(address.as_bytes());
            bs58::encode(bytes).into_string()
        }
        AddressFormat::Raw => hex::encode(address.as_bytes()),
    }
}

/// Deployment the explorer is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Local network with a single guardian
    #[default]
    Devnet,
    /// Public testnet
    Testnet,
    /// Mainnet
    Mainnet,
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Devnet => write!(f, "devnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Mainnet => write!(f, "mainnet"),
        }
    }
}

/// Chain id of the governance emitter on every network
pub const GOVERNANCE_CHAIN: u16 = 1;

/// Address of the devnet guardian key
const DEVNET_GUARDIAN: [u8; 20] = [
    0xbe, 0xfa, 0x42, 0x9d, 0x57, 0xcd, 0x18, 0xb7, 0xf8, 0xa4, 0xd9, 0x1a, 0x2d, 0xa9, 0xab, 0x4a,
    0xf0, 0x5d, 0x0f, 0xbe,
];

impl Network {
    /// The distinguished governance emitter `(chain, address)`.
    pub fn governance_emitter(&self) -> (u16, H256) {
        (GOVERNANCE_CHAIN, H256::from_low_u64_be(4))
    }

    /// Guardian set known ahead of time for this network, if any.
    pub fn initial_guardian_set(&self) -> Option<crate::GuardianSet> {
        match self {
            Network::Devnet => Some(crate::GuardianSet::new(
                0,
                vec![crate::H160::from(DEVNET_GUARDIAN)],
            )),
            Network::Testnet | Network::Mainnet => None,
        }
    }
}
