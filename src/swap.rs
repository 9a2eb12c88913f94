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

//! The atomic swap transaction driver: a deterministic, resumable state
//! machine advancing the lock sub-transaction through rounds of peer
//! exchange.
//!
//! Every `update` re-reads the persisted parameters, rebuilds the lock
//! builder, decides which state the swap is in, optionally emits one peer
//! bundle and persists the new state. Cryptographic parameters are always
//! persisted before the corresponding bundle is handed to the transport,
//! so a crash between the two leaves a store the protocol can resume
//! from; the state parameter advances only after a successful send, which
//! makes a failed send retriable by the next tick.
//!
//! Incoming bundles are merged through [`AtomicSwapTransaction::
//! apply_peer_parameters`]: a parameter matching the stored bytes is
//! skipped, a conflicting one drops the whole bundle. Replays and
//! out-of-order deliveries therefore never move the state backwards.

use std::io;

use tracing::{debug, info, warn};

use crate::blockchain::{ChainContext, Height, DEFAULT_TX_LIFETIME};
use crate::consensus::{self, Decodable, Encodable};
use crate::gateway::Gateway;
use crate::lock::LockTxBuilder;
use crate::messages::{TxParameters, PROTO_VERSION};
use crate::params::{ParamId, ParameterStore, SubTxId, TxCtx, TxId};
use crate::transaction::KernelId;
use crate::wallet::WalletDb;
use crate::Res;

/// Swap state machine errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Peer public data is absent on a side that did not initiate the
    /// swap; only the initiator may run ahead of first contact.
    #[error("Peer public data absent on a non-initiating side")]
    NotInitiator,
    /// The transport refused the outgoing bundle; retriable.
    #[error("Failed to send transaction parameters")]
    FailedToSendParameters,
}

/// Transaction types known to the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[display(Debug)]
pub enum TxType {
    Simple,
    AtomicSwap,
}

/// Lifecycle status of the whole swap, persisted for the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[display(Debug)]
pub enum Status {
    Pending,
    InProgress,
    Cancelled,
    Completed,
    Failed,
}

impl Encodable for Status {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            Status::Pending => 0x00u8.consensus_encode(writer),
            Status::InProgress => 0x01u8.consensus_encode(writer),
            Status::Cancelled => 0x02u8.consensus_encode(writer),
            Status::Completed => 0x03u8.consensus_encode(writer),
            Status::Failed => 0x04u8.consensus_encode(writer),
        }
    }
}

impl Decodable for Status {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x00u8 => Ok(Status::Pending),
            0x01u8 => Ok(Status::InProgress),
            0x02u8 => Ok(Status::Cancelled),
            0x03u8 => Ok(Status::Completed),
            0x04u8 => Ok(Status::Failed),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl_strict_encoding!(Status);

/// State of the lock sub-transaction. Advances monotonically; terminal
/// states absorb every further event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[display(Debug)]
pub enum State {
    Initial,
    Invitation,
    SharedUTXOProofPart2,
    SharedUTXOProofPart3,
    KernelConfirmation,
    Completed,
    Failed,
}

impl State {
    fn rank(self) -> u8 {
        match self {
            State::Initial => 0,
            State::Invitation => 1,
            State::SharedUTXOProofPart2 => 2,
            State::SharedUTXOProofPart3 => 3,
            State::KernelConfirmation => 4,
            State::Completed => 5,
            State::Failed => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

impl Encodable for State {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        self.rank().consensus_encode(writer)
    }
}

impl Decodable for State {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x00u8 => Ok(State::Initial),
            0x01u8 => Ok(State::Invitation),
            0x02u8 => Ok(State::SharedUTXOProofPart2),
            0x03u8 => Ok(State::SharedUTXOProofPart3),
            0x04u8 => Ok(State::KernelConfirmation),
            0x05u8 => Ok(State::Completed),
            0x06u8 => Ok(State::Failed),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl_strict_encoding!(State);

/// Reasons a swap records on terminal failure, and the retriable
/// transport reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[display(Debug)]
pub enum FailureReason {
    FailedToSendParameters,
    TransactionExpired,
    InvalidPeerSignature,
    SizeOverflow,
    InvalidTransaction,
    Cancelled,
}

impl Encodable for FailureReason {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            FailureReason::FailedToSendParameters => 0x01u8.consensus_encode(writer),
            FailureReason::TransactionExpired => 0x02u8.consensus_encode(writer),
            FailureReason::InvalidPeerSignature => 0x03u8.consensus_encode(writer),
            FailureReason::SizeOverflow => 0x04u8.consensus_encode(writer),
            FailureReason::InvalidTransaction => 0x05u8.consensus_encode(writer),
            FailureReason::Cancelled => 0x06u8.consensus_encode(writer),
        }
    }
}

impl Decodable for FailureReason {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        match Decodable::consensus_decode(d)? {
            0x01u8 => Ok(FailureReason::FailedToSendParameters),
            0x02u8 => Ok(FailureReason::TransactionExpired),
            0x03u8 => Ok(FailureReason::InvalidPeerSignature),
            0x04u8 => Ok(FailureReason::SizeOverflow),
            0x05u8 => Ok(FailureReason::InvalidTransaction),
            0x06u8 => Ok(FailureReason::Cancelled),
            _ => Err(consensus::Error::UnknownType),
        }
    }
}

impl_strict_encoding!(FailureReason);

/// The atomic swap transaction: the driver of one `TxId` over the host
/// capabilities it owns.
pub struct AtomicSwapTransaction<S: ParameterStore, W: WalletDb, G: Gateway> {
    tx_id: TxId,
    store: S,
    wallet: W,
    gateway: G,
}

impl<S: ParameterStore, W: WalletDb, G: Gateway> AtomicSwapTransaction<S, W, G> {
    pub fn new(tx_id: TxId, store: S, wallet: W, gateway: G) -> Self {
        AtomicSwapTransaction {
            tx_id,
            store,
            wallet,
            gateway,
        }
    }

    pub fn get_type(&self) -> TxType {
        TxType::AtomicSwap
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Current state of a sub-transaction.
    pub fn get_state(&self, sub_tx: SubTxId) -> Res<State> {
        Ok(self
            .store
            .get(self.tx_id, sub_tx, ParamId::State)?
            .unwrap_or(State::Initial))
    }

    fn ctx(&mut self) -> TxCtx<'_, S, W> {
        TxCtx::new(&mut self.store, &mut self.wallet, self.tx_id, SubTxId::LockTx)
    }

    fn param<T: Decodable>(&self, id: ParamId) -> Res<Option<T>> {
        Ok(self.store.get(self.tx_id, SubTxId::LockTx, id)?)
    }

    fn has_param(&self, id: ParamId) -> bool {
        self.store
            .get_raw(self.tx_id, SubTxId::LockTx, id)
            .is_some()
    }

    /// Advance the lock sub-transaction by one round. Idempotent per
    /// stored state: with no new peer input, a repeated call is a no-op
    /// once the outgoing bundle has been sent.
    pub fn update(&mut self) -> Res<()> {
        let is_sender: bool = self
            .param(ParamId::IsSender)?
            .ok_or(crate::params::Error::MissingParameter(ParamId::IsSender))?;
        let amount: u64 = self
            .param(ParamId::Amount)?
            .ok_or(crate::params::Error::MissingParameter(ParamId::Amount))?;
        let fee: u64 = self
            .param(ParamId::Fee)?
            .ok_or(crate::params::Error::MissingParameter(ParamId::Fee))?;

        let state = self.get_state(SubTxId::LockTx)?;
        if state.is_terminal() {
            return Ok(());
        }

        self.ensure_validity_window()?;

        if state != State::SharedUTXOProofPart3 && self.check_expired()? {
            return Ok(());
        }

        let mut builder = LockTxBuilder::new(amount, fee);
        let have_initial = builder.get_initial_tx_params(&self.ctx())?;
        builder.ensure_offset(&mut self.ctx())?;

        if !have_initial && state == State::Initial {
            if is_sender {
                builder.select_inputs(&mut self.ctx())?;
                builder.add_change_output(&mut self.ctx())?;
            }
            if !builder.finalize_outputs(&mut self.ctx())? {
                return self.on_failed(FailureReason::SizeOverflow, true);
            }
            self.update_status(Status::InProgress)?;
        }

        builder.create_kernel();

        if !builder.get_peer_public_excess_and_nonce(&self.ctx())? {
            // Only the initiator can be ahead of first contact.
            let initiator: bool = self.param(ParamId::IsInitiator)?.unwrap_or(false);
            debug_assert!(initiator);
            if !initiator {
                return Err(Error::NotInitiator.into());
            }
            if state == State::Initial {
                self.send_invitation(&builder, is_sender)?;
                self.set_state(State::Invitation)?;
            }
            return Ok(());
        }

        builder.load_shared_parameters(&mut self.ctx())?;
        builder.sign_partial()?;

        if matches!(state, State::Initial | State::Invitation) {
            // The multisig producer needs the peer's contribution first.
            if is_sender && !self.has_param(ParamId::PeerSharedBulletProofPart2) {
                debug!(tx = %self.tx_id, "waiting for peer proof part2");
                return Ok(());
            }
            builder.shared_utxo_proof_part2(&mut self.ctx(), is_sender)?;
            self.send_bullet_proof_part2(&builder, is_sender)?;
            self.set_state(State::SharedUTXOProofPart2)?;
            return Ok(());
        }

        builder.load_peer_offset(&self.ctx())?;

        if state == State::SharedUTXOProofPart2 {
            if is_sender {
                if !self.has_param(ParamId::PeerSharedBulletProofPart3) {
                    debug!(tx = %self.tx_id, "waiting for peer proof part3");
                    return Ok(());
                }
                builder.shared_utxo_proof_part3(&mut self.ctx(), true)?;

                if !builder.get_peer_signature(&self.ctx())? {
                    return Ok(());
                }
                if !builder.is_peer_signature_valid()? {
                    // A resend may recover; no transition.
                    info!(tx = %self.tx_id, "peer signature is invalid");
                    return Ok(());
                }

                builder.finalize_signature()?;
                builder.add_shared_output(&self.ctx())?;
                builder.store_kernel_id(&mut self.ctx())?;

                let tx = builder.create_transaction()?;
                let chain = ChainContext::at_height(self.gateway.tip_height());
                if let Err(err) = tx.is_valid(&chain) {
                    warn!(tx = %self.tx_id, %err, "assembled transaction is invalid");
                    return self.on_failed(FailureReason::InvalidTransaction, true);
                }

                self.set_state(State::SharedUTXOProofPart3)?;
            } else {
                if !self.has_param(ParamId::PeerSharedBulletProofMSig) {
                    debug!(tx = %self.tx_id, "waiting for proof aggregation object");
                    return Ok(());
                }
                builder.shared_utxo_proof_part3(&mut self.ctx(), false)?;
                builder.store_kernel_id(&mut self.ctx())?;
                self.send_bullet_proof_part3(&builder, is_sender)?;
                self.set_state(State::SharedUTXOProofPart3)?;
            }
            return Ok(());
        }

        if state == State::SharedUTXOProofPart3 {
            if let Some(kernel_id) = self.param::<KernelId>(ParamId::KernelId)? {
                if let Some(height) = self.gateway.confirmed_height(&kernel_id) {
                    self.ctx().set(ParamId::KernelProofHeight, &height)?;
                    self.update_status(Status::Completed)?;
                    self.set_state(State::Completed)?;
                    self.gateway.on_tx_completed(self.tx_id);
                    info!(tx = %self.tx_id, height, "lock kernel confirmed");
                    return Ok(());
                }
            }
            // Still unconfirmed; expire if the window closed.
            self.check_expired()?;
            return Ok(());
        }

        Ok(())
    }

    /// Record terminal failure and stop further updates. In-flight
    /// bundles are not revoked; the counterparty times out on its own.
    pub fn cancel(&mut self) -> Res<()> {
        let state = self.get_state(SubTxId::LockTx)?;
        if state.is_terminal() {
            return Ok(());
        }
        self.on_failed(FailureReason::Cancelled, false)
    }

    /// Merge an incoming peer bundle into the store. Returns false when
    /// the bundle conflicts with already persisted values, in which case
    /// nothing is written (the message implies a stale state and is
    /// dropped).
    pub fn apply_peer_parameters(&mut self, msg: &TxParameters) -> Res<bool> {
        let sub_tx = msg
            .sub_tx_id()
            .map_err(crate::params::Error::from)?
            .unwrap_or(SubTxId::LockTx);

        for (id, bytes) in msg.iter() {
            if *id == ParamId::SubTxIndex {
                continue;
            }
            if let Some(existing) = self.store.get_raw(self.tx_id, sub_tx, *id) {
                if &existing != bytes {
                    warn!(tx = %self.tx_id, param = %id, "conflicting peer parameter, dropping bundle");
                    return Ok(false);
                }
            }
        }

        // Newer peers may carry parameters this version cannot produce;
        // decoding still succeeds, so proceed but leave a trace.
        if let Some(version) = msg
            .get::<u32>(ParamId::PeerProtoVersion)
            .map_err(crate::params::Error::from)?
        {
            if version > PROTO_VERSION {
                warn!(tx = %self.tx_id, version, "peer runs a newer protocol version");
            }
        }

        for (id, bytes) in msg.iter() {
            if *id == ParamId::SubTxIndex {
                continue;
            }
            if self.store.get_raw(self.tx_id, sub_tx, *id).is_none() {
                self.store
                    .set_raw(self.tx_id, sub_tx, *id, bytes.clone())?;
            }
        }

        // A peer failure notification is terminal for us as well.
        if let Some(reason) = msg
            .get::<FailureReason>(ParamId::FailureReason)
            .map_err(crate::params::Error::from)?
        {
            info!(tx = %self.tx_id, %reason, "peer reported failure");
            self.on_failed(reason, false)?;
        }
        Ok(true)
    }

    /// Fix the kernel validity window on first use: `MinHeight` from the
    /// current tip, `MaxHeight` one lifetime later. Both are exchanged in
    /// the invitation so the peers sign the same kernel.
    fn ensure_validity_window(&mut self) -> Res<()> {
        let min_height = match self.param::<Height>(ParamId::MinHeight)? {
            Some(height) => height,
            None => {
                let tip = self.gateway.tip_height();
                self.ctx().set(ParamId::MinHeight, &tip)?;
                tip
            }
        };
        if self.param::<Height>(ParamId::MaxHeight)?.is_none() {
            let max_height = min_height + DEFAULT_TX_LIFETIME;
            self.ctx().set(ParamId::MaxHeight, &max_height)?;
        }
        Ok(())
    }

    /// Terminal expiry check: past `MaxHeight` the swap fails on both
    /// sides independently. Returns whether the swap expired.
    fn check_expired(&mut self) -> Res<bool> {
        let max_height: Height = self
            .param(ParamId::MaxHeight)?
            .ok_or(crate::params::Error::MissingParameter(ParamId::MaxHeight))?;
        if self.gateway.tip_height() <= max_height {
            return Ok(false);
        }
        self.on_failed(FailureReason::TransactionExpired, true)?;
        Ok(true)
    }

    fn update_status(&mut self, status: Status) -> Res<()> {
        self.ctx().set(ParamId::Status, &status)?;
        Ok(())
    }

    /// Persist a state transition. Only forward transitions are applied;
    /// anything else is dropped, which keeps replays harmless.
    fn set_state(&mut self, state: State) -> Res<()> {
        let current = self.get_state(SubTxId::LockTx)?;
        if current.is_terminal() {
            return Ok(());
        }
        if state != State::Failed && state.rank() <= current.rank() {
            warn!(tx = %self.tx_id, from = %current, to = %state, "ignoring stale state transition");
            return Ok(());
        }
        debug!(tx = %self.tx_id, from = %current, to = %state, "state transition");
        self.ctx().set(ParamId::State, &state)?;
        Ok(())
    }

    /// Record terminal failure, optionally notifying the peer with a
    /// single best-effort bundle.
    fn on_failed(&mut self, reason: FailureReason, notify_peer: bool) -> Res<()> {
        if self.get_state(SubTxId::LockTx)?.is_terminal() {
            return Ok(());
        }
        info!(tx = %self.tx_id, %reason, "lock transaction failed");
        self.ctx().set(ParamId::FailureReason, &reason)?;
        let status = if reason == FailureReason::Cancelled {
            Status::Cancelled
        } else {
            Status::Failed
        };
        self.update_status(status)?;
        self.set_state(State::Failed)?;

        if notify_peer {
            let msg = TxParameters::new(self.tx_id)
                .with(ParamId::SubTxIndex, &SubTxId::LockTx)
                .with(ParamId::FailureReason, &reason);
            if self.gateway.send_tx_parameters(msg).is_err() {
                warn!(tx = %self.tx_id, "failed to notify peer of failure");
            }
        }

        self.gateway.on_tx_failed(self.tx_id, reason);
        Ok(())
    }

    fn send(&mut self, msg: TxParameters) -> Res<()> {
        if let Err(err) = self.gateway.send_tx_parameters(msg) {
            warn!(tx = %self.tx_id, %err, "transport refused bundle");
            return Err(Error::FailedToSendParameters.into());
        }
        Ok(())
    }

    /// Invitation, initiator to responder. The sender flag is flipped so
    /// the peer persists its own role.
    fn send_invitation(&mut self, builder: &LockTxBuilder, is_sender: bool) -> Res<()> {
        let swap_amount: u64 = self.param(ParamId::AtomicSwapAmount)?.ok_or(
            crate::params::Error::MissingParameter(ParamId::AtomicSwapAmount),
        )?;
        let swap_coin: crate::blockchain::AtomicSwapCoin = self
            .param(ParamId::AtomicSwapCoin)?
            .ok_or(crate::params::Error::MissingParameter(ParamId::AtomicSwapCoin))?;

        let msg = TxParameters::new(self.tx_id)
            .with(ParamId::Amount, &builder.amount())
            .with(ParamId::Fee, &builder.fee())
            .with(ParamId::IsSender, &!is_sender)
            .with(ParamId::AtomicSwapAmount, &swap_amount)
            .with(ParamId::AtomicSwapCoin, &swap_coin)
            .with(ParamId::SubTxIndex, &SubTxId::LockTx)
            .with(ParamId::MinHeight, &builder.min_height())
            .with(ParamId::PeerProtoVersion, &PROTO_VERSION)
            .with(ParamId::PeerPublicExcess, &builder.public_excess().compress())
            .with(ParamId::PeerPublicNonce, &builder.public_nonce().compress());

        self.send(msg)
    }

    /// Part2 bundle. The multisig producer ships the aggregation object;
    /// the contributor ships its public data, its blinding share in
    /// public form and its Part2.
    fn send_bullet_proof_part2(&mut self, builder: &LockTxBuilder, is_sender: bool) -> Res<()> {
        let mut msg = TxParameters::new(self.tx_id)
            .with(ParamId::SubTxIndex, &SubTxId::LockTx)
            .with(ParamId::PeerSignature, &builder.partial_signature())
            .with(ParamId::PeerOffset, &builder.offset());

        if is_sender {
            msg.add_parameter(ParamId::PeerSharedBulletProofMSig, builder.proof_multi_sig());
        } else {
            msg.add_parameter(ParamId::PeerProtoVersion, &PROTO_VERSION);
            msg.add_parameter(
                ParamId::PeerPublicExcess,
                &builder.public_excess().compress(),
            );
            msg.add_parameter(ParamId::PeerPublicNonce, &builder.public_nonce().compress());
            msg.add_parameter(
                ParamId::PeerPublicSharedBlindingFactor,
                &builder.public_shared_blinding_factor().compress(),
            );
            msg.add_parameter(
                ParamId::PeerSharedBulletProofPart2,
                &builder.shared_proof().part2,
            );
        }

        self.send(msg)
    }

    /// Part3 bundle, contributor to producer only.
    fn send_bullet_proof_part3(&mut self, builder: &LockTxBuilder, is_sender: bool) -> Res<()> {
        if is_sender {
            return Ok(());
        }
        let msg = TxParameters::new(self.tx_id)
            .with(ParamId::SubTxIndex, &SubTxId::LockTx)
            .with(
                ParamId::PeerSharedBulletProofPart3,
                &builder.shared_proof().part3,
            );
        self.send(msg)
    }
}
