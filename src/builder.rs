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

//! The base transaction builder: input selection, change creation, kernel
//! construction and the two-party Schnorr signing rounds.
//!
//! A builder is a transient working view. It is constructed at the start
//! of every state machine update, re-populated from the parameter store,
//! and dropped when the update returns; nothing in here survives a crash
//! that the store does not.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;

use crate::blockchain::{Amount, Height, MAX_TX_BODY_SIZE};
use crate::consensus;
use crate::crypto::rangeproof::{
    generate_seed, generate_seed_kid, ConfidentialProof, CreatorParams, Phase,
};
use crate::crypto::{self, Oracle, Signature};
use crate::params::{ParamId, ParameterStore, TxCtx};
use crate::transaction::{Input, Kernel, KernelId, Output, Transaction};
use crate::wallet::{CoinId, WalletDb};
use crate::Res;

/// Fresh oracle seeded with the output maturity marker, shared by proving
/// and verification of output proofs.
pub(crate) fn proof_oracle(maturity: Height) -> Oracle {
    let mut oracle = Oracle::default();
    oracle.append(&maturity);
    oracle
}

/// Working state of one sub-transaction under construction.
pub struct BaseTxBuilder {
    // input
    amount_list: Vec<Amount>,
    fee: Amount,
    change: Amount,
    min_height: Height,
    max_height: Height,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    input_coins: Vec<CoinId>,
    blinding_excess: Scalar,
    offset: Scalar,
    offset_base: Scalar,

    // peer values
    peer_public_nonce: Option<RistrettoPoint>,
    peer_public_excess: Option<RistrettoPoint>,
    peer_signature: Option<Scalar>,
    peer_offset: Scalar,

    // deduced values
    kernel: Option<Kernel>,
    nonce: Scalar,
    message: [u8; 32],
    challenge: Option<Scalar>,
    partial_signature: Scalar,
}

impl BaseTxBuilder {
    pub fn new(amount_list: Vec<Amount>, fee: Amount) -> Self {
        BaseTxBuilder {
            amount_list,
            fee,
            change: 0,
            min_height: 0,
            max_height: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_coins: Vec::new(),
            blinding_excess: Scalar::ZERO,
            offset: Scalar::ZERO,
            offset_base: Scalar::ZERO,
            peer_public_nonce: None,
            peer_public_excess: None,
            peer_signature: None,
            peer_offset: Scalar::ZERO,
            kernel: None,
            nonce: Scalar::ZERO,
            message: [0u8; 32],
            challenge: None,
            partial_signature: Scalar::ZERO,
        }
    }

    /// Re-populate the builder from the store. Returns whether the
    /// initial transaction body (inputs and outputs) was already built
    /// and persisted by an earlier update.
    pub fn get_initial_tx_params<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &TxCtx<S, W>,
    ) -> Res<bool> {
        self.min_height = ctx.get(ParamId::MinHeight)?.unwrap_or(0);
        self.max_height = ctx.get(ParamId::MaxHeight)?.unwrap_or(0);
        self.change = ctx.get(ParamId::Change)?.unwrap_or(0);

        if let Some(excess) = ctx.get(ParamId::BlindingExcess)? {
            self.blinding_excess = excess;
        }
        if let Some(offset) = ctx.get::<Scalar>(ParamId::Offset)? {
            self.offset = offset;
            self.offset_base = offset;
        }
        if let Some(coins) = ctx.get(ParamId::InputCoins)? {
            self.input_coins = coins;
        }

        let inputs: Option<Vec<Input>> = ctx.get(ParamId::Inputs)?;
        let outputs: Option<Vec<Output>> = ctx.get(ParamId::Outputs)?;

        let present = inputs.is_some() || outputs.is_some();
        if let Some(inputs) = inputs {
            self.inputs = inputs;
        }
        if let Some(outputs) = outputs {
            self.outputs = outputs;
        }
        Ok(present)
    }

    /// Fix this party's offset base on first use: a secret scalar folded
    /// into the kernel secret and into the transmitted offset, masking
    /// every blinding contribution that later joins the offset. Derived
    /// from the master KDF so a restarted wallet reproduces it.
    pub fn ensure_offset<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &mut TxCtx<S, W>,
    ) -> Res<()> {
        if ctx.get::<Scalar>(ParamId::Offset)?.is_some() {
            return Ok(());
        }
        let mut data = consensus::serialize(&ctx.tx_id);
        data.extend_from_slice(&consensus::serialize(&ctx.sub_tx));
        self.offset_base = ctx.wallet.master_kdf().derive_scalar(b"gloam.offset", &data);
        self.offset = self.offset_base;
        ctx.set(ParamId::Offset, &self.offset_base)?;
        Ok(())
    }

    /// The scalar this party's kernel share signs with: the blinding
    /// excess of its inputs and outputs plus the offset base.
    fn kernel_secret(&self) -> Scalar {
        self.blinding_excess + self.offset_base
    }

    /// Select wallet coins covering amount plus fee. The difference
    /// becomes the change value.
    pub fn select_inputs<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &mut TxCtx<S, W>,
    ) -> Res<()> {
        let needed = self.amount() + self.fee;
        let coins = ctx.wallet.select_coins(needed)?;

        let mut total = 0;
        for coin in &coins {
            let blinding = ctx.wallet.coin_blinding(&coin.id);
            self.inputs.push(Input {
                commitment: crypto::commit(coin.id.value, &blinding).compress(),
            });
            self.input_coins.push(coin.id);
            self.blinding_excess -= blinding;
            total += coin.id.value;
        }
        self.change = total - needed;
        Ok(())
    }

    /// Create the change output for any surplus selected.
    pub fn add_change_output<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &mut TxCtx<S, W>,
    ) -> Res<()> {
        if self.change == 0 {
            return Ok(());
        }
        let coin = ctx.wallet.generate_change_coin(self.change)?;
        self.add_output(ctx, coin.id)
    }

    /// Create an output owned by this wallet, with a single-pass proof.
    pub fn add_output<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &mut TxCtx<S, W>,
        coin: CoinId,
    ) -> Res<()> {
        let output = Self::create_output(ctx, coin)?;
        let blinding = ctx.wallet.coin_blinding(&coin);
        self.blinding_excess += blinding;
        self.outputs.push(output);
        Ok(())
    }

    /// Build a proven output for a wallet coin.
    pub fn create_output<S: ParameterStore, W: WalletDb>(
        ctx: &TxCtx<S, W>,
        coin: CoinId,
    ) -> Res<Output> {
        let blinding = ctx.wallet.coin_blinding(&coin);
        let commitment = crypto::commit(coin.value, &blinding).compress();
        let creator = CreatorParams {
            kidv: coin,
            seed: generate_seed_kid(&commitment, ctx.wallet.master_kdf()),
            commitment,
        };
        let seed = generate_seed(&blinding, coin.value, &mut Oracle::default());
        let mut proof = ConfidentialProof::default();
        proof.co_sign(
            &seed,
            &blinding,
            &creator,
            &mut proof_oracle(crate::blockchain::SHARED_OUTPUT_MATURITY),
            Phase::SinglePass,
            None,
        )?;
        Ok(Output { commitment, proof })
    }

    /// Persist the built transaction body and blinding sums, and check
    /// the chain size limit. Returns false on overflow.
    pub fn finalize_outputs<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &mut TxCtx<S, W>,
    ) -> Res<bool> {
        ctx.set(ParamId::Inputs, &self.inputs)?;
        ctx.set(ParamId::Outputs, &self.outputs)?;
        ctx.set(ParamId::InputCoins, &self.input_coins)?;
        ctx.set(ParamId::BlindingExcess, &self.blinding_excess)?;
        ctx.set(ParamId::Offset, &self.offset_base)?;
        ctx.set(ParamId::Change, &self.change)?;

        let body = consensus::serialize(&self.inputs).len()
            + consensus::serialize(&self.outputs).len();
        Ok(body <= MAX_TX_BODY_SIZE)
    }

    /// Instantiate the kernel over the fee and validity window, and
    /// derive this party's secret signing nonce from the blinding excess.
    pub fn create_kernel(&mut self) {
        let kernel = Kernel::new(self.fee, self.min_height, self.max_height);
        self.message = kernel.message();
        self.nonce = crypto::derive_nonce(&self.kernel_secret(), &self.message);
        self.kernel = Some(kernel);
    }

    /// Load the peer's public excess and nonce if the peer has shared
    /// them yet.
    pub fn get_peer_public_excess_and_nonce<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &TxCtx<S, W>,
    ) -> Res<bool> {
        let excess = ctx.get::<CompressedRistretto>(ParamId::PeerPublicExcess)?;
        let nonce = ctx.get::<CompressedRistretto>(ParamId::PeerPublicNonce)?;
        match (excess, nonce) {
            (Some(excess), Some(nonce)) => {
                self.peer_public_excess =
                    Some(excess.decompress().ok_or(crypto::Error::InvalidPoint)?);
                self.peer_public_nonce =
                    Some(nonce.decompress().ok_or(crypto::Error::InvalidPoint)?);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Load the peer's offset contribution, identity if not yet shared.
    pub fn load_peer_offset<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &TxCtx<S, W>,
    ) -> Res<()> {
        self.peer_offset = ctx.get(ParamId::PeerOffset)?.unwrap_or(Scalar::ZERO);
        Ok(())
    }

    /// Load the peer's partial signature if present.
    pub fn get_peer_signature<S: ParameterStore, W: WalletDb>(
        &mut self,
        ctx: &TxCtx<S, W>,
    ) -> Res<bool> {
        self.peer_signature = ctx.get(ParamId::PeerSignature)?;
        Ok(self.peer_signature.is_some())
    }

    /// Compute this party's partial Schnorr signature over the kernel
    /// message. Requires the peer's public excess and nonce.
    pub fn sign_partial(&mut self) -> Res<()> {
        let peer_excess = self
            .peer_public_excess
            .ok_or(crate::params::Error::MissingParameter(
                ParamId::PeerPublicExcess,
            ))?;
        let peer_nonce = self
            .peer_public_nonce
            .ok_or(crate::params::Error::MissingParameter(
                ParamId::PeerPublicNonce,
            ))?;

        let total_nonce = (self.public_nonce() + peer_nonce).compress();
        let total_excess = (self.public_excess() + peer_excess).compress();
        let challenge = crypto::signature_challenge(&total_nonce, &total_excess, &self.message);

        if let Some(kernel) = self.kernel.as_mut() {
            kernel.excess = total_excess;
        }
        self.partial_signature =
            crypto::partial_signature(&self.kernel_secret(), &self.nonce, &challenge);
        self.challenge = Some(challenge);
        Ok(())
    }

    /// Validate the peer's partial signature against its public excess
    /// and nonce.
    pub fn is_peer_signature_valid(&self) -> Res<bool> {
        let (challenge, peer_sig) = match (self.challenge, self.peer_signature) {
            (Some(challenge), Some(sig)) => (challenge, sig),
            _ => return Ok(false),
        };
        let (excess, nonce) = match (self.peer_public_excess, self.peer_public_nonce) {
            (Some(excess), Some(nonce)) => (excess, nonce),
            _ => return Ok(false),
        };
        Ok(crypto::verify_partial(&excess, &nonce, &challenge, &peer_sig))
    }

    /// Aggregate both partial signatures into the kernel signature.
    pub fn finalize_signature(&mut self) -> Res<()> {
        let peer_sig = self
            .peer_signature
            .ok_or(crate::params::Error::MissingParameter(ParamId::PeerSignature))?;
        let peer_nonce = self
            .peer_public_nonce
            .ok_or(crate::params::Error::MissingParameter(
                ParamId::PeerPublicNonce,
            ))?;
        let total_nonce = (self.public_nonce() + peer_nonce).compress();
        let kernel = self.kernel.as_mut().ok_or(crypto::Error::InvalidSignature)?;
        kernel.signature = Some(Signature {
            nonce: total_nonce,
            value: self.partial_signature + peer_sig,
        });
        Ok(())
    }

    /// Persist the kernel identifier for later chain observation.
    pub fn store_kernel_id<S: ParameterStore, W: WalletDb>(
        &self,
        ctx: &mut TxCtx<S, W>,
    ) -> Res<()> {
        let id = self.kernel_id().ok_or(crypto::Error::InvalidSignature)?;
        ctx.set(ParamId::KernelId, &id)?;
        Ok(())
    }

    /// Assemble the transaction from the working state. The kernel must
    /// carry the aggregate signature.
    pub fn create_transaction(&self) -> Res<Transaction> {
        let kernel = self.kernel.clone().ok_or(crypto::Error::InvalidSignature)?;
        Ok(Transaction {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            kernel,
            offset: self.offset + self.peer_offset,
        })
    }

    pub fn amount(&self) -> Amount {
        self.amount_list.iter().sum()
    }

    pub fn amount_list(&self) -> &[Amount] {
        &self.amount_list
    }

    pub fn fee(&self) -> Amount {
        self.fee
    }

    pub fn change(&self) -> Amount {
        self.change
    }

    pub fn min_height(&self) -> Height {
        self.min_height
    }

    pub fn max_height(&self) -> Height {
        self.max_height
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn offset(&self) -> Scalar {
        self.offset
    }

    pub(crate) fn offset_mut(&mut self) -> &mut Scalar {
        &mut self.offset
    }

    pub(crate) fn push_output(&mut self, output: Output) {
        self.outputs.push(output);
    }

    pub fn partial_signature(&self) -> Scalar {
        self.partial_signature
    }

    pub fn public_excess(&self) -> RistrettoPoint {
        self.kernel_secret() * crypto::g()
    }

    pub fn public_nonce(&self) -> RistrettoPoint {
        self.nonce * crypto::g()
    }

    pub fn kernel(&self) -> Option<&Kernel> {
        self.kernel.as_ref()
    }

    pub fn kernel_id(&self) -> Option<KernelId> {
        self.kernel.as_ref().map(Kernel::id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ChainContext;
    use crate::params::{MemoryStore, SubTxId, TxId};
    use crate::wallet::MemoryWallet;

    fn ctx<'a>(
        store: &'a mut MemoryStore,
        wallet: &'a mut MemoryWallet,
        tx_id: TxId,
    ) -> TxCtx<'a, MemoryStore, MemoryWallet> {
        TxCtx::new(store, wallet, tx_id, SubTxId::LockTx)
    }

    #[test]
    fn builder_is_rebuilt_identically_from_the_store() {
        let mut store = MemoryStore::new();
        let mut wallet = MemoryWallet::new(b"builder");
        wallet.fund(&[60, 70]);
        let tx_id = TxId::from_slice(&[5u8; 16]);

        let mut builder = BaseTxBuilder::new(vec![100], 1);
        {
            let mut c = ctx(&mut store, &mut wallet, tx_id);
            c.set(ParamId::MinHeight, &10u64).unwrap();
            c.set(ParamId::MaxHeight, &1450u64).unwrap();
            assert!(!builder.get_initial_tx_params(&c).unwrap());
            builder.select_inputs(&mut c).unwrap();
            builder.add_change_output(&mut c).unwrap();
            assert!(builder.finalize_outputs(&mut c).unwrap());
        }
        assert_eq!(builder.change(), 29);
        assert_eq!(builder.inputs().len(), 2);
        assert_eq!(builder.outputs().len(), 1);

        let mut rebuilt = BaseTxBuilder::new(vec![100], 1);
        {
            let c = ctx(&mut store, &mut wallet, tx_id);
            assert!(rebuilt.get_initial_tx_params(&c).unwrap());
        }
        assert_eq!(rebuilt.inputs(), builder.inputs());
        assert_eq!(rebuilt.outputs(), builder.outputs());
        assert_eq!(rebuilt.change(), builder.change());
        assert_eq!(rebuilt.public_excess(), builder.public_excess());
    }

    #[test]
    fn insufficient_funds_surface_before_any_write() {
        let mut store = MemoryStore::new();
        let mut wallet = MemoryWallet::new(b"poor");
        wallet.fund(&[50]);
        let tx_id = TxId::from_slice(&[6u8; 16]);

        let mut builder = BaseTxBuilder::new(vec![100], 1);
        let mut c = ctx(&mut store, &mut wallet, tx_id);
        assert!(builder.select_inputs(&mut c).is_err());
        drop(c);
        assert_eq!(store, MemoryStore::new());
    }

    /// Two builders play both sides of the signing rounds directly,
    /// without the swap driver, and assemble a valid transaction.
    #[test]
    fn two_party_kernel_signing() {
        let tx_id = TxId::from_slice(&[7u8; 16]);
        let mut store_a = MemoryStore::new();
        let mut store_b = MemoryStore::new();
        let mut wallet_a = MemoryWallet::new(b"alice");
        let mut wallet_b = MemoryWallet::new(b"bob");
        wallet_a.fund(&[101]);

        let mut alice = BaseTxBuilder::new(vec![100], 1);
        let mut bob = BaseTxBuilder::new(vec![100], 1);

        {
            let mut c = ctx(&mut store_a, &mut wallet_a, tx_id);
            c.set(ParamId::MinHeight, &0u64).unwrap();
            c.set(ParamId::MaxHeight, &1440u64).unwrap();
            alice.get_initial_tx_params(&c).unwrap();
            alice.select_inputs(&mut c).unwrap();
            // Alice sends the whole coin: 100 to the joint output, 1 fee.
            assert_eq!(alice.change(), 0);
            alice.add_change_output(&mut c).unwrap();
            alice.finalize_outputs(&mut c).unwrap();
        }
        {
            let mut c = ctx(&mut store_b, &mut wallet_b, tx_id);
            c.set(ParamId::MinHeight, &0u64).unwrap();
            c.set(ParamId::MaxHeight, &1440u64).unwrap();
            bob.get_initial_tx_params(&c).unwrap();
            bob.finalize_outputs(&mut c).unwrap();
        }

        alice.create_kernel();
        bob.create_kernel();

        // Exchange publics.
        {
            let mut c = ctx(&mut store_a, &mut wallet_a, tx_id);
            c.set(ParamId::PeerPublicExcess, &bob.public_excess().compress())
                .unwrap();
            c.set(ParamId::PeerPublicNonce, &bob.public_nonce().compress())
                .unwrap();
        }
        {
            let mut c = ctx(&mut store_b, &mut wallet_b, tx_id);
            c.set(ParamId::PeerPublicExcess, &alice.public_excess().compress())
                .unwrap();
            c.set(ParamId::PeerPublicNonce, &alice.public_nonce().compress())
                .unwrap();
        }

        assert!(alice
            .get_peer_public_excess_and_nonce(&ctx(&mut store_a, &mut wallet_a, tx_id))
            .unwrap());
        assert!(bob
            .get_peer_public_excess_and_nonce(&ctx(&mut store_b, &mut wallet_b, tx_id))
            .unwrap());
        alice.sign_partial().unwrap();
        bob.sign_partial().unwrap();

        // Alice receives Bob's partial signature and aggregates. The
        // transaction spends 101 into a 100 output signed jointly; Bob
        // contributes no coins, so his excess is the identity.
        let mut c = ctx(&mut store_a, &mut wallet_a, tx_id);
        c.set(ParamId::PeerSignature, &bob.partial_signature())
            .unwrap();
        let shared_coin = wallet_b.generate_shared_coin(100).unwrap();
        drop(c);

        // The joint output here is owned by Bob alone so the balance
        // closes through the offset, mirroring the lock transaction.
        let blinding = wallet_b.coin_blinding(&shared_coin.id);
        let output = {
            let c = ctx(&mut store_b, &mut wallet_b, tx_id);
            BaseTxBuilder::create_output(&c, shared_coin.id).unwrap()
        };
        alice.push_output(output);
        *alice.offset_mut() -= blinding;

        let c = ctx(&mut store_a, &mut wallet_a, tx_id);
        assert!(alice.get_peer_signature(&c).unwrap());
        drop(c);
        assert!(alice.is_peer_signature_valid().unwrap());
        alice.finalize_signature().unwrap();

        let tx = alice.create_transaction().unwrap();
        tx.is_valid(&ChainContext::at_height(10)).unwrap();
    }

    #[test]
    fn tampered_peer_signature_is_rejected() {
        let mut alice = BaseTxBuilder::new(vec![10], 1);
        let mut bob = BaseTxBuilder::new(vec![10], 1);
        alice.min_height = 0;
        alice.max_height = 100;
        bob.min_height = 0;
        bob.max_height = 100;
        alice.blinding_excess = Scalar::from(111u64);
        bob.blinding_excess = Scalar::from(222u64);
        alice.create_kernel();
        bob.create_kernel();

        alice.peer_public_excess = Some(bob.public_excess());
        alice.peer_public_nonce = Some(bob.public_nonce());
        bob.peer_public_excess = Some(alice.public_excess());
        bob.peer_public_nonce = Some(alice.public_nonce());
        alice.sign_partial().unwrap();
        bob.sign_partial().unwrap();

        alice.peer_signature = Some(bob.partial_signature());
        assert!(alice.is_peer_signature_valid().unwrap());
        alice.peer_signature = Some(bob.partial_signature() + Scalar::ONE);
        assert!(!alice.is_peer_signature_valid().unwrap());
    }
}
