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

//! The typed parameter store: the sole source of truth of a swap.
//!
//! Every value the protocol produces or receives is persisted under a
//! `(TxId, SubTxId, ParamId)` key before the corresponding peer bundle is
//! emitted. In-memory builders are views over this store and can be
//! reconstructed from it at any point. The store is append-only in
//! practice: parameters are never deleted mid-transaction, which is what
//! makes crash recovery a plain re-read.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io;

use thiserror::Error;

use crate::consensus::{self, Decodable, Encodable};
use crate::wallet::WalletDb;

fixed_hash::construct_fixed_hash!(
    /// A transaction identifier, shared between the two peers of a swap.
    #[derive(Serialize, Deserialize)]
    pub struct TxId(16);
);

impl TxId {
    /// Generate a fresh random identifier.
    pub fn new_random() -> Self {
        Self::from_slice(uuid::Uuid::new_v4().as_bytes())
    }
}

impl Encodable for TxId {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        self.0.consensus_encode(s)
    }
}

impl Decodable for TxId {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        let bytes: [u8; 16] = Decodable::consensus_decode(d)?;
        Ok(Self::from_slice(&bytes))
    }
}

impl_strict_encoding!(TxId);

/// Identifies a sub-transaction of an atomic swap. Only the lock
/// sub-transaction is driven by this crate; the redeem and refund values
/// are reserved with stable encodings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[display(Debug)]
pub enum SubTxId {
    LockTx,
    RedeemTx,
    RefundTx,
}

impl Encodable for SubTxId {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            SubTxId::LockTx => 0x02u8.consensus_encode(writer),
            SubTxId::RedeemTx => 0x03u8.consensus_encode(writer),
            SubTxId::RefundTx => 0x04u8.consensus_encode(writer),
        }
    }
}

impl Decodable for SubTxId {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x02u8 => Ok(SubTxId::LockTx),
            0x03u8 => Ok(SubTxId::RedeemTx),
            0x04u8 => Ok(SubTxId::RefundTx),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl_strict_encoding!(SubTxId);

/// The catalogue of typed parameters a swap persists and exchanges.
///
/// `Peer*` identifiers name values *about the counterparty* from the
/// owner's perspective: an outgoing bundle writes them already flipped, so
/// applying a bundle is a straight store write on the receiving side.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[display(Debug)]
pub enum ParamId {
    // Transaction-wide values.
    IsSender,
    IsInitiator,
    Amount,
    Fee,
    Change,
    MinHeight,
    MaxHeight,
    Status,
    FailureReason,
    AtomicSwapAmount,
    AtomicSwapCoin,
    State,
    SubTxIndex,
    // Builder state.
    Inputs,
    Outputs,
    InputCoins,
    BlindingExcess,
    Offset,
    KernelId,
    KernelProofHeight,
    // Peer values.
    PeerProtoVersion,
    PeerPublicExcess,
    PeerPublicNonce,
    PeerSignature,
    PeerOffset,
    PeerPublicSharedBlindingFactor,
    PeerSharedBulletProofPart2,
    PeerSharedBulletProofPart3,
    PeerSharedBulletProofMSig,
    // Shared output values, never transmitted in secret form.
    SharedBlindingFactor,
    SharedSeed,
    SharedCoinId,
    SharedBulletProof,
}

impl ParamId {
    /// Stable wire and storage discriminant.
    pub fn to_u16(self) -> u16 {
        match self {
            ParamId::IsSender => 0x0001,
            ParamId::IsInitiator => 0x0002,
            ParamId::Amount => 0x0003,
            ParamId::Fee => 0x0004,
            ParamId::Change => 0x0005,
            ParamId::MinHeight => 0x0006,
            ParamId::MaxHeight => 0x0007,
            ParamId::Status => 0x0008,
            ParamId::FailureReason => 0x0009,
            ParamId::AtomicSwapAmount => 0x000a,
            ParamId::AtomicSwapCoin => 0x000b,
            ParamId::State => 0x000c,
            ParamId::SubTxIndex => 0x000d,
            ParamId::Inputs => 0x0010,
            ParamId::Outputs => 0x0011,
            ParamId::InputCoins => 0x0012,
            ParamId::BlindingExcess => 0x0013,
            ParamId::Offset => 0x0014,
            ParamId::KernelId => 0x0015,
            ParamId::KernelProofHeight => 0x0016,
            ParamId::PeerProtoVersion => 0x0020,
            ParamId::PeerPublicExcess => 0x0021,
            ParamId::PeerPublicNonce => 0x0022,
            ParamId::PeerSignature => 0x0023,
            ParamId::PeerOffset => 0x0024,
            ParamId::PeerPublicSharedBlindingFactor => 0x0025,
            ParamId::PeerSharedBulletProofPart2 => 0x0026,
            ParamId::PeerSharedBulletProofPart3 => 0x0027,
            ParamId::PeerSharedBulletProofMSig => 0x0028,
            ParamId::SharedBlindingFactor => 0x0030,
            ParamId::SharedSeed => 0x0031,
            ParamId::SharedCoinId => 0x0032,
            ParamId::SharedBulletProof => 0x0033,
        }
    }

    pub fn from_u16(value: u16) -> Result<Self, consensus::Error> {
        Ok(match value {
            0x0001 => ParamId::IsSender,
            0x0002 => ParamId::IsInitiator,
            0x0003 => ParamId::Amount,
            0x0004 => ParamId::Fee,
            0x0005 => ParamId::Change,
            0x0006 => ParamId::MinHeight,
            0x0007 => ParamId::MaxHeight,
            0x0008 => ParamId::Status,
            0x0009 => ParamId::FailureReason,
            0x000a => ParamId::AtomicSwapAmount,
            0x000b => ParamId::AtomicSwapCoin,
            0x000c => ParamId::State,
            0x000d => ParamId::SubTxIndex,
            0x0010 => ParamId::Inputs,
            0x0011 => ParamId::Outputs,
            0x0012 => ParamId::InputCoins,
            0x0013 => ParamId::BlindingExcess,
            0x0014 => ParamId::Offset,
            0x0015 => ParamId::KernelId,
            0x0016 => ParamId::KernelProofHeight,
            0x0020 => ParamId::PeerProtoVersion,
            0x0021 => ParamId::PeerPublicExcess,
            0x0022 => ParamId::PeerPublicNonce,
            0x0023 => ParamId::PeerSignature,
            0x0024 => ParamId::PeerOffset,
            0x0025 => ParamId::PeerPublicSharedBlindingFactor,
            0x0026 => ParamId::PeerSharedBulletProofPart2,
            0x0027 => ParamId::PeerSharedBulletProofPart3,
            0x0028 => ParamId::PeerSharedBulletProofMSig,
            0x0030 => ParamId::SharedBlindingFactor,
            0x0031 => ParamId::SharedSeed,
            0x0032 => ParamId::SharedCoinId,
            0x0033 => ParamId::SharedBulletProof,
            _ => return Err(consensus::Error::UnknownType),
        })
    }
}

impl Encodable for ParamId {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        self.to_u16().consensus_encode(writer)
    }
}

impl Decodable for ParamId {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        ParamId::from_u16(Decodable::consensus_decode(d)?)
    }
}

impl_strict_encoding!(ParamId);

/// Parameter store errors.
#[derive(Error, Debug)]
pub enum Error {
    /// A persisted value failed to decode as the requested type.
    #[error("Parameter encoding error: {0}")]
    Encoding(#[from] consensus::Error),
    /// A mandatory parameter is absent from the store.
    #[error("Missing mandatory parameter {0}")]
    MissingParameter(ParamId),
    /// The backing storage failed.
    #[error("Storage error: {0}")]
    Storage(Box<dyn std::error::Error + Send + Sync>),
}

/// Persistent mapping from `(TxId, SubTxId, ParamId)` to encoded values.
///
/// `set_raw` is a durable upsert: once it returns, a crashed process
/// observes the write on restart. Implementations must flush before the
/// swap driver hands an outgoing bundle to the transport.
pub trait ParameterStore {
    fn get_raw(&self, tx_id: TxId, sub_tx: SubTxId, id: ParamId) -> Option<Vec<u8>>;

    fn set_raw(
        &mut self,
        tx_id: TxId,
        sub_tx: SubTxId,
        id: ParamId,
        value: Vec<u8>,
    ) -> Result<(), Error>;

    /// Typed read through the consensus encoding.
    fn get<T: Decodable>(
        &self,
        tx_id: TxId,
        sub_tx: SubTxId,
        id: ParamId,
    ) -> Result<Option<T>, Error> {
        match self.get_raw(tx_id, sub_tx, id) {
            None => Ok(None),
            Some(bytes) => Ok(Some(consensus::deserialize(&bytes)?)),
        }
    }

    /// Typed durable upsert through the consensus encoding.
    fn set<T: Encodable + Debug>(
        &mut self,
        tx_id: TxId,
        sub_tx: SubTxId,
        id: ParamId,
        value: &T,
    ) -> Result<(), Error> {
        self.set_raw(tx_id, sub_tx, id, consensus::serialize(value))
    }
}

impl<S: ParameterStore> ParameterStore for &mut S {
    fn get_raw(&self, tx_id: TxId, sub_tx: SubTxId, id: ParamId) -> Option<Vec<u8>> {
        (**self).get_raw(tx_id, sub_tx, id)
    }

    fn set_raw(
        &mut self,
        tx_id: TxId,
        sub_tx: SubTxId,
        id: ParamId,
        value: Vec<u8>,
    ) -> Result<(), Error> {
        (**self).set_raw(tx_id, sub_tx, id, value)
    }
}

/// In-memory reference store. Durability is the host's concern; this
/// backend is for tests and single-process embedding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    values: BTreeMap<(TxId, SubTxId, ParamId), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParameterStore for MemoryStore {
    fn get_raw(&self, tx_id: TxId, sub_tx: SubTxId, id: ParamId) -> Option<Vec<u8>> {
        self.values.get(&(tx_id, sub_tx, id)).cloned()
    }

    fn set_raw(
        &mut self,
        tx_id: TxId,
        sub_tx: SubTxId,
        id: ParamId,
        value: Vec<u8>,
    ) -> Result<(), Error> {
        self.values.insert((tx_id, sub_tx, id), value);
        Ok(())
    }
}

/// The working view handed to builders for one `update` call: the store
/// and wallet capabilities scoped to one sub-transaction. Builders never
/// hold it across updates.
pub struct TxCtx<'a, S: ParameterStore, W: WalletDb> {
    pub store: &'a mut S,
    pub wallet: &'a mut W,
    pub tx_id: TxId,
    pub sub_tx: SubTxId,
}

impl<'a, S: ParameterStore, W: WalletDb> TxCtx<'a, S, W> {
    pub fn new(store: &'a mut S, wallet: &'a mut W, tx_id: TxId, sub_tx: SubTxId) -> Self {
        TxCtx {
            store,
            wallet,
            tx_id,
            sub_tx,
        }
    }

    pub fn get<T: Decodable>(&self, id: ParamId) -> Result<Option<T>, Error> {
        self.store.get(self.tx_id, self.sub_tx, id)
    }

    pub fn mandatory<T: Decodable>(&self, id: ParamId) -> Result<T, Error> {
        self.get(id)?.ok_or(Error::MissingParameter(id))
    }

    pub fn set<T: Encodable + Debug>(&mut self, id: ParamId, value: &T) -> Result<(), Error> {
        self.store.set(self.tx_id, self.sub_tx, id, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{deserialize, serialize, serialize_hex};

    #[test]
    fn param_id_roundtrip() {
        for id in [
            ParamId::IsSender,
            ParamId::State,
            ParamId::PeerSharedBulletProofMSig,
            ParamId::SharedBulletProof,
        ] {
            assert_eq!(deserialize::<ParamId>(&serialize(&id)).unwrap(), id);
        }
        assert!(ParamId::from_u16(0xffff).is_err());
    }

    #[test]
    fn sub_tx_id_encoding_is_stable() {
        assert_eq!(serialize_hex(&SubTxId::LockTx), "02");
        assert_eq!(serialize_hex(&SubTxId::RedeemTx), "03");
        assert_eq!(serialize_hex(&SubTxId::RefundTx), "04");
    }

    #[test]
    fn store_typed_roundtrip() {
        let mut store = MemoryStore::new();
        let tx_id = TxId::new_random();
        store
            .set(tx_id, SubTxId::LockTx, ParamId::Amount, &100u64)
            .unwrap();
        assert_eq!(
            store
                .get::<u64>(tx_id, SubTxId::LockTx, ParamId::Amount)
                .unwrap(),
            Some(100)
        );
        // Absent under another key.
        assert_eq!(
            store
                .get::<u64>(tx_id, SubTxId::RedeemTx, ParamId::Amount)
                .unwrap(),
            None
        );
        // Upsert overwrites.
        store
            .set(tx_id, SubTxId::LockTx, ParamId::Amount, &250u64)
            .unwrap();
        assert_eq!(
            store
                .get::<u64>(tx_id, SubTxId::LockTx, ParamId::Amount)
                .unwrap(),
            Some(250)
        );
    }

    #[test]
    fn tx_id_encoding() {
        let tx_id = TxId::from_slice(&[0xab; 16]);
        let bytes = serialize(&tx_id);
        assert_eq!(bytes.len(), 16);
        assert_eq!(deserialize::<TxId>(&bytes).unwrap(), tx_id);
    }
}
