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

//! The lock transaction builder: everything specific to the jointly owned
//! confidential output of an atomic swap.
//!
//! The shared output's blinding factor is the sum of two secrets, one per
//! wallet, derived from each wallet's KDF at the persisted shared coin
//! identifier. Neither secret ever crosses the wire; only its public form
//! does. The shared proof is built cooperatively in three phases, and
//! each side folds the negated secret into its offset so the final
//! transaction balances once both halves combine.

use std::ops::{Deref, DerefMut};

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;

use crate::blockchain::{Amount, SHARED_OUTPUT_MATURITY};
use crate::builder::{proof_oracle, BaseTxBuilder};
use crate::crypto::rangeproof::{
    generate_seed, generate_seed_kid, ConfidentialProof, CreatorParams, Part2, Part3, Phase,
    ProofMultiSig,
};
use crate::crypto::{self, Oracle};
use crate::params::{ParamId, ParameterStore, TxCtx};
use crate::transaction::Output;
use crate::wallet::{CoinId, WalletDb};
use crate::Res;

/// Builder of the lock sub-transaction. Wraps the base builder and adds
/// the shared output state.
pub struct LockTxBuilder {
    base: BaseTxBuilder,
    shared_blinding: Scalar,
    shared_seed: [u8; 32],
    shared_coin_id: Option<CoinId>,
    shared_proof: ConfidentialProof,
    proof_msig: ProofMultiSig,
    creator_params: Option<CreatorParams>,
}

impl Deref for LockTxBuilder {
    type Target = BaseTxBuilder;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl DerefMut for LockTxBuilder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl LockTxBuilder {
    pub fn new(amount: Amount, fee: Amount) -> Self {
        LockTxBuilder {
            base: BaseTxBuilder::new(vec![amount], fee),
            shared_blinding: Scalar::ZERO,
            shared_seed: [0u8; 32],
            shared_coin_id: None,
            shared_proof: ConfidentialProof::default(),
            proof_msig: ProofMultiSig::default(),
            creator_params: None,
        }
    }

    /// Generate the shared coin, blinding factor and proof seed on first
    /// use, or reload them from the store, then fold the negated blinding
    /// into the offset.
    pub fn load_shared_parameters<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &mut TxCtx<S, W>,
    ) -> Res<()> {
        if let Some(blinding) = ctx.get::<Scalar>(ParamId::SharedBlindingFactor)? {
            self.shared_blinding = blinding;
            self.shared_seed = ctx.mandatory(ParamId::SharedSeed)?;
            self.shared_coin_id = Some(ctx.mandatory(ParamId::SharedCoinId)?);
            if let Some(proof) = ctx.get(ParamId::SharedBulletProof)? {
                self.shared_proof = proof;
            }
        } else {
            let coin = ctx.wallet.generate_shared_coin(self.amount())?;
            ctx.set(ParamId::SharedCoinId, &coin.id)?;

            self.shared_coin_id = Some(coin.id);
            self.shared_blinding = ctx.wallet.coin_blinding(&coin.id);
            ctx.set(ParamId::SharedBlindingFactor, &self.shared_blinding)?;

            self.shared_seed =
                generate_seed(&self.shared_blinding, self.amount(), &mut Oracle::default());
            ctx.set(ParamId::SharedSeed, &self.shared_seed)?;
        }

        // The shared blinding leaves through the offset, not the kernel.
        *self.base.offset_mut() -= self.shared_blinding;
        Ok(())
    }

    /// Second phase of the shared proof. The multisig producer combines
    /// the peer's Part2 and emits the aggregation object; the contributor
    /// emits its own Part2.
    pub fn shared_utxo_proof_part2<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &mut TxCtx<S, W>,
        produce_multisig: bool,
    ) -> Res<()> {
        if produce_multisig {
            let mut oracle = proof_oracle(SHARED_OUTPUT_MATURITY);
            let peer_part2: Part2 = ctx.mandatory(ParamId::PeerSharedBulletProofPart2)?;
            self.shared_proof.part2 = peer_part2;

            let creator = self.proof_creator_params(ctx)?;
            let (seed, blinding) = (self.shared_seed, self.shared_blinding);
            self.shared_proof.co_sign(
                &seed,
                &blinding,
                &creator,
                &mut oracle,
                Phase::Step2,
                Some(&mut self.proof_msig),
            )?;

            ctx.set(ParamId::SharedBulletProof, &self.shared_proof)?;
        } else {
            self.shared_proof.part2 = Part2::default();
            ProofMultiSig::co_sign_part(&self.shared_seed, &mut self.shared_proof.part2)?;
        }
        Ok(())
    }

    /// Third phase. The producer folds the peer's Part3 into the final
    /// proof; the contributor answers the aggregation object with its
    /// Part3.
    pub fn shared_utxo_proof_part3<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &mut TxCtx<S, W>,
        produce_multisig: bool,
    ) -> Res<()> {
        if produce_multisig {
            let mut oracle = proof_oracle(SHARED_OUTPUT_MATURITY);
            let peer_part3: Part3 = ctx.mandatory(ParamId::PeerSharedBulletProofPart3)?;
            self.shared_proof.part3 = peer_part3;

            let creator = self.proof_creator_params(ctx)?;
            let (seed, blinding) = (self.shared_seed, self.shared_blinding);
            self.shared_proof
                .co_sign(&seed, &blinding, &creator, &mut oracle, Phase::Finalize, None)?;

            ctx.set(ParamId::SharedBulletProof, &self.shared_proof)?;
        } else {
            self.proof_msig = ctx.mandatory(ParamId::PeerSharedBulletProofMSig)?;

            self.shared_proof.part3 = Part3::default();
            self.proof_msig.co_sign_part3(
                &self.shared_seed,
                &self.shared_blinding,
                &mut self.shared_proof.part3,
            )?;
        }
        Ok(())
    }

    /// Append the shared output, carrying the finalized shared proof.
    pub fn add_shared_output<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &TxCtx<S, W>,
    ) -> Res<()> {
        let output = Output {
            commitment: self.shared_commitment(ctx)?.compress(),
            proof: self.shared_proof,
        };
        self.base.push_output(output);
        Ok(())
    }

    /// The shared output commitment:
    /// `amount·H + mine·G + peer_public_share`.
    pub fn shared_commitment<S: ParameterStore, W: WalletDb>(
        &self,
        ctx: &TxCtx<S, W>,
    ) -> Res<RistrettoPoint> {
        let peer_share: CompressedRistretto =
            ctx.mandatory(ParamId::PeerPublicSharedBlindingFactor)?;
        let peer_share = peer_share
            .decompress()
            .ok_or(crypto::Error::InvalidPoint)?;
        Ok(crypto::commit(self.amount(), &self.shared_blinding) + peer_share)
    }

    /// This party's public share of the shared blinding factor, the only
    /// form of it that is ever transmitted.
    pub fn public_shared_blinding_factor(&self) -> RistrettoPoint {
        self.shared_blinding * crypto::g()
    }

    /// Proof creator parameters, memoized per builder. Both sides derive
    /// identical values because the inputs (shared coin identifier,
    /// shared commitment, master KDF contribution) agree by construction.
    pub fn proof_creator_params<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &TxCtx<S, W>,
    ) -> Res<CreatorParams> {
        if let Some(params) = self.creator_params {
            return Ok(params);
        }
        let kidv = self
            .shared_coin_id
            .ok_or(crate::params::Error::MissingParameter(ParamId::SharedCoinId))?;
        let commitment = self.shared_commitment(ctx)?.compress();
        let params = CreatorParams {
            kidv,
            seed: generate_seed_kid(&commitment, ctx.wallet.master_kdf()),
            commitment,
        };
        self.creator_params = Some(params);
        Ok(params)
    }

    pub fn shared_proof(&self) -> &ConfidentialProof {
        &self.shared_proof
    }

    pub fn proof_multi_sig(&self) -> &ProofMultiSig {
        &self.proof_msig
    }

    pub fn shared_blinding_factor(&self) -> &Scalar {
        &self.shared_blinding
    }

    pub fn shared_seed(&self) -> &[u8; 32] {
        &self.shared_seed
    }

    pub fn shared_coin_id(&self) -> Option<&CoinId> {
        self.shared_coin_id.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{MemoryStore, SubTxId, TxId};
    use crate::wallet::{CoinKind, MemoryWallet};

    fn ctx<'a>(
        store: &'a mut MemoryStore,
        wallet: &'a mut MemoryWallet,
        tx_id: TxId,
    ) -> TxCtx<'a, MemoryStore, MemoryWallet> {
        TxCtx::new(store, wallet, tx_id, SubTxId::LockTx)
    }

    #[test]
    fn shared_parameters_persist_and_reload() {
        let mut store = MemoryStore::new();
        let mut wallet = MemoryWallet::new(b"lock");
        let tx_id = TxId::from_slice(&[9u8; 16]);

        let mut first = LockTxBuilder::new(100, 1);
        first
            .load_shared_parameters(&mut ctx(&mut store, &mut wallet, tx_id))
            .unwrap();
        let coin = *first.shared_coin_id().unwrap();
        assert_eq!(coin.kind, CoinKind::Shared);
        assert_eq!(coin.value, 100);

        // A rebuilt builder sees the exact same secrets.
        let mut second = LockTxBuilder::new(100, 1);
        second
            .load_shared_parameters(&mut ctx(&mut store, &mut wallet, tx_id))
            .unwrap();
        assert_eq!(second.shared_blinding_factor(), first.shared_blinding_factor());
        assert_eq!(second.shared_seed(), first.shared_seed());
        assert_eq!(second.shared_coin_id(), Some(&coin));
        assert_eq!(second.offset(), first.offset());
    }

    #[test]
    fn shared_commitment_closes_over_both_shares() {
        let mut store = MemoryStore::new();
        let mut wallet = MemoryWallet::new(b"commit");
        let tx_id = TxId::from_slice(&[10u8; 16]);

        let mut builder = LockTxBuilder::new(100, 1);
        builder
            .load_shared_parameters(&mut ctx(&mut store, &mut wallet, tx_id))
            .unwrap();

        let peer_blinding = Scalar::from(90210u64);
        let mut c = ctx(&mut store, &mut wallet, tx_id);
        c.set(
            ParamId::PeerPublicSharedBlindingFactor,
            &(peer_blinding * crypto::g()).compress(),
        )
        .unwrap();

        let commitment = builder.shared_commitment(&c).unwrap();
        let total = builder.shared_blinding_factor() + peer_blinding;
        assert_eq!(commitment, crypto::commit(100, &total));
    }

    #[test]
    fn off_curve_peer_share_is_rejected() {
        let mut store = MemoryStore::new();
        let mut wallet = MemoryWallet::new(b"offcurve");
        let tx_id = TxId::from_slice(&[11u8; 16]);

        let mut builder = LockTxBuilder::new(100, 1);
        builder
            .load_shared_parameters(&mut ctx(&mut store, &mut wallet, tx_id))
            .unwrap();

        let mut c = ctx(&mut store, &mut wallet, tx_id);
        // A deliberately invalid point encoding.
        c.set(
            ParamId::PeerPublicSharedBlindingFactor,
            &CompressedRistretto([0xffu8; 32]),
        )
        .unwrap();
        assert!(builder.shared_commitment(&c).is_err());
    }
}
