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

//! Shared fixtures for the protocol tests: a capturing gateway and the
//! two-wallet swap harness.

use std::collections::HashMap;

use gloam_swap_core::blockchain::{Amount, AtomicSwapCoin, Height};
use gloam_swap_core::consensus;
use gloam_swap_core::gateway::{Error as GatewayError, Gateway};
use gloam_swap_core::messages::TxParameters;
use gloam_swap_core::params::{MemoryStore, ParamId, ParameterStore, SubTxId, TxId};
use gloam_swap_core::swap::{AtomicSwapTransaction, FailureReason};
use gloam_swap_core::transaction::KernelId;
use gloam_swap_core::wallet::MemoryWallet;

/// Gateway capturing everything the driver does: outgoing bundles, the
/// raw bytes that crossed the wire, chain state and lifecycle hooks.
#[derive(Default)]
pub struct TestGateway {
    pub outbox: Vec<TxParameters>,
    pub wire: Vec<Vec<u8>>,
    pub tip: Height,
    pub confirmed: HashMap<KernelId, Height>,
    pub completed: Vec<TxId>,
    pub failed: Vec<(TxId, FailureReason)>,
    pub fail_send: bool,
}

impl TestGateway {
    pub fn at_height(tip: Height) -> Self {
        TestGateway {
            tip,
            ..Default::default()
        }
    }
}

impl Gateway for TestGateway {
    fn send_tx_parameters(&mut self, msg: TxParameters) -> Result<(), GatewayError> {
        if self.fail_send {
            return Err(GatewayError::send_failed("transport down"));
        }
        self.wire.push(consensus::serialize(&msg));
        self.outbox.push(msg);
        Ok(())
    }

    fn tip_height(&self) -> Height {
        self.tip
    }

    fn confirmed_height(&self, kernel_id: &KernelId) -> Option<Height> {
        self.confirmed.get(kernel_id).copied()
    }

    fn on_tx_completed(&mut self, tx_id: TxId) {
        self.completed.push(tx_id);
    }

    fn on_tx_failed(&mut self, tx_id: TxId, reason: FailureReason) {
        self.failed.push((tx_id, reason));
    }
}

pub type SwapTx = AtomicSwapTransaction<MemoryStore, MemoryWallet, TestGateway>;

pub const AMOUNT: Amount = 100;
pub const FEE: Amount = 1;
pub const TIP: Height = 10;

/// The initiating side, holding the native coins being locked.
pub fn sender(tx_id: TxId, funding: &[Amount]) -> SwapTx {
    let mut store = MemoryStore::new();
    store
        .set(tx_id, SubTxId::LockTx, ParamId::IsSender, &true)
        .unwrap();
    store
        .set(tx_id, SubTxId::LockTx, ParamId::IsInitiator, &true)
        .unwrap();
    store
        .set(tx_id, SubTxId::LockTx, ParamId::Amount, &AMOUNT)
        .unwrap();
    store
        .set(tx_id, SubTxId::LockTx, ParamId::Fee, &FEE)
        .unwrap();
    store
        .set(tx_id, SubTxId::LockTx, ParamId::AtomicSwapAmount, &5000u64)
        .unwrap();
    store
        .set(
            tx_id,
            SubTxId::LockTx,
            ParamId::AtomicSwapCoin,
            &AtomicSwapCoin::Bitcoin,
        )
        .unwrap();

    let mut wallet = MemoryWallet::new(b"sender wallet");
    wallet.fund(funding);

    AtomicSwapTransaction::new(tx_id, store, wallet, TestGateway::at_height(TIP))
}

/// The responding side; everything else arrives with the invitation.
pub fn responder(tx_id: TxId) -> SwapTx {
    let mut store = MemoryStore::new();
    store
        .set(tx_id, SubTxId::LockTx, ParamId::IsInitiator, &false)
        .unwrap();
    let wallet = MemoryWallet::new(b"responder wallet");
    AtomicSwapTransaction::new(tx_id, store, wallet, TestGateway::at_height(TIP))
}

/// Rebuild a transaction from a persisted store, as a restarted wallet
/// process would.
pub fn resume(tx_id: TxId, store: MemoryStore, wallet_seed: &[u8], tip: Height) -> SwapTx {
    AtomicSwapTransaction::new(
        tx_id,
        store,
        MemoryWallet::new(wallet_seed),
        TestGateway::at_height(tip),
    )
}

/// Deliver every pending bundle back and forth until both sides go
/// quiet. Returns all bundles exchanged, in delivery order.
pub fn pump(a: &mut SwapTx, b: &mut SwapTx) -> Vec<TxParameters> {
    let mut log = Vec::new();
    loop {
        let from_a: Vec<_> = a.gateway_mut().outbox.drain(..).collect();
        let from_b: Vec<_> = b.gateway_mut().outbox.drain(..).collect();
        if from_a.is_empty() && from_b.is_empty() {
            return log;
        }
        for msg in from_a {
            assert!(b.apply_peer_parameters(&msg).unwrap());
            b.update().unwrap();
            log.push(msg);
        }
        for msg in from_b {
            assert!(a.apply_peer_parameters(&msg).unwrap());
            a.update().unwrap();
            log.push(msg);
        }
    }
}

/// Typed read of a persisted lock parameter.
pub fn lock_param<T: gloam_swap_core::consensus::Decodable>(
    tx: &SwapTx,
    id: ParamId,
) -> Option<T> {
    tx.store().get(tx.tx_id(), SubTxId::LockTx, id).unwrap()
}

pub fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
