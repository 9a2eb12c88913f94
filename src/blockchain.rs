// Copyright 2022-2023 Gloam Devs
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 3 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301, USA

//! Chain constants and the validation context shared by transaction
//! assembly and the swap driver.

use std::io;

use crate::consensus::{self, Decodable, Encodable};

/// Amount of native chain assets, in base units.
pub type Amount = u64;

/// Block height on the native chain.
pub type Height = u64;

/// Number of blocks past `MinHeight` after which an unconfirmed swap
/// transaction is considered expired on both sides.
pub const DEFAULT_TX_LIFETIME: Height = 1440;

/// Upper bound on the consensus-encoded size of a transaction body
/// (inputs plus outputs); exceeding it at finalization is terminal.
pub const MAX_TX_BODY_SIZE: usize = 0x20000;

/// Maturity marker appended to the shared-output proof transcript. The
/// shared output carries no extra maturity, hence zero.
pub const SHARED_OUTPUT_MATURITY: Height = 0;

/// The counter-chain coin locked on the other side of an atomic swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[display(Debug)]
pub enum AtomicSwapCoin {
    Bitcoin,
    Litecoin,
    Qtum,
}

impl Encodable for AtomicSwapCoin {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            AtomicSwapCoin::Bitcoin => 0x01u8.consensus_encode(writer),
            AtomicSwapCoin::Litecoin => 0x02u8.consensus_encode(writer),
            AtomicSwapCoin::Qtum => 0x03u8.consensus_encode(writer),
        }
    }
}

impl Decodable for AtomicSwapCoin {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x01u8 => Ok(AtomicSwapCoin::Bitcoin),
            0x02u8 => Ok(AtomicSwapCoin::Litecoin),
            0x03u8 => Ok(AtomicSwapCoin::Qtum),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl_strict_encoding!(AtomicSwapCoin);

/// Validation context for assembled transactions: the chain state a
/// transaction is checked against.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainContext {
    /// Current chain tip height.
    pub height: Height,
}

impl ChainContext {
    pub fn at_height(height: Height) -> Self {
        Self { height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{deserialize, serialize_hex};

    #[test]
    fn swap_coin_encoding() {
        assert_eq!(serialize_hex(&AtomicSwapCoin::Bitcoin), "01");
        assert_eq!(
            deserialize::<AtomicSwapCoin>(&[0x03]).unwrap(),
            AtomicSwapCoin::Qtum
        );
        assert!(deserialize::<AtomicSwapCoin>(&[0x00]).is_err());
    }
}
