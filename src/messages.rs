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

//! Peer parameter bundles exchanged between swap wallets.
//!
//! A bundle is an ordered set of `(ParamId, bytes)` pairs under one
//! transaction identifier. The transport guarantees at-least-once
//! delivery; bundles are idempotent on the receiver because each incoming
//! parameter either matches the stored value or advances the state.

use std::io;

use crate::consensus::{self, Decodable, Encodable};
use crate::params::{ParamId, SubTxId, TxId};

/// The protocol version advertised in outgoing bundles, gating forward
/// compatibility of parameter encodings.
pub const PROTO_VERSION: u32 = 1;

/// A set of transaction parameters addressed to the counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxParameters {
    tx_id: TxId,
    params: Vec<(ParamId, Vec<u8>)>,
}

impl TxParameters {
    pub fn new(tx_id: TxId) -> Self {
        TxParameters {
            tx_id,
            params: Vec::new(),
        }
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// Append a typed parameter, chainable.
    pub fn with<T: Encodable + std::fmt::Debug>(mut self, id: ParamId, value: &T) -> Self {
        self.add_parameter(id, value);
        self
    }

    /// Append a typed parameter in place.
    pub fn add_parameter<T: Encodable + std::fmt::Debug>(&mut self, id: ParamId, value: &T) {
        self.params.push((id, consensus::serialize(value)));
    }

    /// Append an already-encoded parameter in place.
    pub fn add_raw(&mut self, id: ParamId, bytes: Vec<u8>) {
        self.params.push((id, bytes));
    }

    /// Read back a typed parameter, if present.
    pub fn get<T: Decodable>(&self, id: ParamId) -> Result<Option<T>, consensus::Error> {
        match self.params.iter().find(|(pid, _)| *pid == id) {
            None => Ok(None),
            Some((_, bytes)) => Ok(Some(consensus::deserialize(bytes)?)),
        }
    }

    /// The sub-transaction this bundle addresses.
    pub fn sub_tx_id(&self) -> Result<Option<SubTxId>, consensus::Error> {
        self.get(ParamId::SubTxIndex)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ParamId, Vec<u8>)> {
        self.params.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl Encodable for TxParameters {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let mut len = self.tx_id.consensus_encode(writer)?;
        if self.params.len() > u16::MAX as usize {
            return Err(io::Error::new(io::ErrorKind::Other, "Value is too long"));
        }
        len += (self.params.len() as u16).consensus_encode(writer)?;
        for (id, bytes) in &self.params {
            len += id.consensus_encode(writer)?;
            len += bytes.consensus_encode(writer)?;
        }
        Ok(len)
    }
}

impl Decodable for TxParameters {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        let tx_id = Decodable::consensus_decode(d)?;
        let count = u16::consensus_decode(d)?;
        let mut params = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = ParamId::consensus_decode(d)?;
            let bytes = Vec::<u8>::consensus_decode(d)?;
            params.push((id, bytes));
        }
        Ok(TxParameters { tx_id, params })
    }
}

impl_strict_encoding!(TxParameters);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::AtomicSwapCoin;
    use crate::consensus::{deserialize, serialize};

    #[test]
    fn bundle_roundtrip() {
        let tx_id = TxId::from_slice(&[1u8; 16]);
        let msg = TxParameters::new(tx_id)
            .with(ParamId::SubTxIndex, &SubTxId::LockTx)
            .with(ParamId::Amount, &100u64)
            .with(ParamId::IsSender, &false)
            .with(ParamId::AtomicSwapCoin, &AtomicSwapCoin::Bitcoin);

        let decoded: TxParameters = deserialize(&serialize(&msg)).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.tx_id(), tx_id);
        assert_eq!(decoded.sub_tx_id().unwrap(), Some(SubTxId::LockTx));
        assert_eq!(decoded.get::<u64>(ParamId::Amount).unwrap(), Some(100));
        assert_eq!(decoded.get::<u64>(ParamId::Fee).unwrap(), None);
    }

    #[test]
    fn typed_mismatch_is_an_error() {
        let msg =
            TxParameters::new(TxId::from_slice(&[2u8; 16])).with(ParamId::Amount, &100u64);
        // An eight byte integer does not decode as a one byte flag.
        assert!(msg.get::<bool>(ParamId::Amount).is_err());
    }
}
