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

//! The wallet database contract the swap core builds against: coin
//! selection, change and shared-coin reservation, and KDF access. The
//! cryptographic path reads the wallet, except for the shared-coin
//! generators which atomically reserve a fresh key slot.

use std::io;

use curve25519_dalek::scalar::Scalar;
use thiserror::Error;

use crate::blockchain::Amount;
use crate::consensus::{self, Decodable, Encodable};
use crate::crypto::kdf::{switch_blinding, Kdf};

/// Wallet database errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Not enough unspent value to cover the requested amount.
    #[error("Insufficient funds: {available} available, {required} required")]
    InsufficientFunds { required: Amount, available: Amount },
    /// Any wallet error not part of this list.
    #[error("Wallet error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// The role a coin plays inside a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[display(Debug)]
pub enum CoinKind {
    /// An ordinary received output.
    Regular,
    /// Change returned by one of our own transactions.
    Change,
    /// A swap output whose blinding is split with a counterparty.
    Shared,
}

impl Encodable for CoinKind {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            CoinKind::Regular => 0x01u8.consensus_encode(writer),
            CoinKind::Change => 0x02u8.consensus_encode(writer),
            CoinKind::Shared => 0x03u8.consensus_encode(writer),
        }
    }
}

impl Decodable for CoinKind {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x01u8 => Ok(CoinKind::Regular),
            0x02u8 => Ok(CoinKind::Change),
            0x03u8 => Ok(CoinKind::Shared),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

/// Identifier of a coin: the key slot it was derived from, its value and
/// its kind. The switch-commitment scheme maps an identifier to the
/// coin's blinding factor, so persisting the identifier is enough to
/// re-derive the secret after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinId {
    /// Key index inside the subkey space.
    pub idx: u64,
    /// Subkey index selecting the child KDF.
    pub sub_idx: u32,
    /// Committed value.
    pub value: Amount,
    /// Coin kind.
    pub kind: CoinKind,
}

impl Encodable for CoinId {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let mut len = self.idx.consensus_encode(writer)?;
        len += self.sub_idx.consensus_encode(writer)?;
        len += self.value.consensus_encode(writer)?;
        Ok(len + self.kind.consensus_encode(writer)?)
    }
}

impl Decodable for CoinId {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(CoinId {
            idx: Decodable::consensus_decode(d)?,
            sub_idx: Decodable::consensus_decode(d)?,
            value: Decodable::consensus_decode(d)?,
            kind: Decodable::consensus_decode(d)?,
        })
    }
}

impl_strict_encoding!(CoinId);

/// A wallet coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coin {
    pub id: CoinId,
}

impl Coin {
    pub fn new(id: CoinId) -> Self {
        Coin { id }
    }
}

/// The wallet database capability handed to the swap core.
pub trait WalletDb {
    /// Select unspent coins covering at least `amount`, marking them as
    /// reserved. Errors when the wallet balance cannot cover the amount.
    fn select_coins(&mut self, amount: Amount) -> Result<Vec<Coin>, Error>;

    /// Reserve a fresh change coin of the given value.
    fn generate_change_coin(&mut self, value: Amount) -> Result<Coin, Error>;

    /// Reserve a fresh shared coin of the given value on a fresh subkey
    /// index. The reservation is atomic: two concurrent swaps never share
    /// a slot.
    fn generate_shared_coin(&mut self, value: Amount) -> Result<Coin, Error>;

    /// The wallet master KDF, read-only after wallet open.
    fn master_kdf(&self) -> &Kdf;

    /// The child KDF for a subkey index.
    fn child_kdf(&self, sub_idx: u32) -> Kdf;

    /// The blinding factor of one of this wallet's coins.
    fn coin_blinding(&self, id: &CoinId) -> Scalar {
        switch_blinding(&self.child_kdf(id.sub_idx), id)
    }
}

impl<W: WalletDb> WalletDb for &mut W {
    fn select_coins(&mut self, amount: Amount) -> Result<Vec<Coin>, Error> {
        (**self).select_coins(amount)
    }

    fn generate_change_coin(&mut self, value: Amount) -> Result<Coin, Error> {
        (**self).generate_change_coin(value)
    }

    fn generate_shared_coin(&mut self, value: Amount) -> Result<Coin, Error> {
        (**self).generate_shared_coin(value)
    }

    fn master_kdf(&self) -> &Kdf {
        (**self).master_kdf()
    }

    fn child_kdf(&self, sub_idx: u32) -> Kdf {
        (**self).child_kdf(sub_idx)
    }
}

/// In-memory reference wallet. Enough for tests and single-process hosts;
/// production wallets implement [`WalletDb`] over their own storage.
pub struct MemoryWallet {
    master: Kdf,
    next_idx: u64,
    next_shared_sub_idx: u32,
    unspent: Vec<Coin>,
}

impl MemoryWallet {
    pub fn new(seed: &[u8]) -> Self {
        MemoryWallet {
            master: Kdf::from_seed(seed),
            next_idx: 1,
            next_shared_sub_idx: 1,
            unspent: Vec::new(),
        }
    }

    /// Credit the wallet with regular coins of the given values.
    pub fn fund(&mut self, values: &[Amount]) {
        for &value in values {
            let id = CoinId {
                idx: self.reserve_idx(),
                sub_idx: 0,
                value,
                kind: CoinKind::Regular,
            };
            self.unspent.push(Coin::new(id));
        }
    }

    pub fn balance(&self) -> Amount {
        self.unspent.iter().map(|c| c.id.value).sum()
    }

    fn reserve_idx(&mut self) -> u64 {
        let idx = self.next_idx;
        self.next_idx += 1;
        idx
    }
}

impl WalletDb for MemoryWallet {
    fn select_coins(&mut self, amount: Amount) -> Result<Vec<Coin>, Error> {
        let available = self.balance();
        if available < amount {
            return Err(Error::InsufficientFunds {
                required: amount,
                available,
            });
        }
        let mut selected = Vec::new();
        let mut total = 0;
        while total < amount {
            let coin = self.unspent.remove(0);
            total += coin.id.value;
            selected.push(coin);
        }
        Ok(selected)
    }

    fn generate_change_coin(&mut self, value: Amount) -> Result<Coin, Error> {
        Ok(Coin::new(CoinId {
            idx: self.reserve_idx(),
            sub_idx: 0,
            value,
            kind: CoinKind::Change,
        }))
    }

    fn generate_shared_coin(&mut self, value: Amount) -> Result<Coin, Error> {
        let sub_idx = self.next_shared_sub_idx;
        self.next_shared_sub_idx += 1;
        Ok(Coin::new(CoinId {
            idx: self.reserve_idx(),
            sub_idx,
            value,
            kind: CoinKind::Shared,
        }))
    }

    fn master_kdf(&self) -> &Kdf {
        &self.master
    }

    fn child_kdf(&self, sub_idx: u32) -> Kdf {
        self.master.derive_child(sub_idx)
    }
}
