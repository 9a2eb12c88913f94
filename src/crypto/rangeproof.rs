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

//! The co-signed confidential proof attached to every output, and its
//! three-phase multi-party construction for outputs whose blinding factor
//! is split between two wallets.
//!
//! One side (the multisig producer) aggregates: in `Step2` it folds the
//! peer's Part2 contribution into the combined nonce commitment and emits
//! the [`ProofMultiSig`] aggregation object; in `Finalize` it folds the
//! peer's Part3 responses into the final proof. The other side only
//! contributes raw parts through [`ProofMultiSig::co_sign_part`] and
//! [`ProofMultiSig::co_sign_part3`]. `SinglePass` builds a complete proof
//! for an ordinary single-owner output.
//!
//! Part1 carries the coin-identifier recovery payload, keyed by the
//! creator seed, so a wallet holding the master KDF can recognize its own
//! outputs from chain data alone.
//!
//! All per-party nonces are derived from the persisted proof seed: a
//! crashed wallet resumed from its parameter store re-produces the exact
//! same parts.

use std::io;

use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::blockchain::Amount;
use crate::consensus::{self, Decodable, Encodable};
use crate::crypto::kdf::Kdf;
use crate::crypto::{g, h, Error, Oracle};
use crate::wallet::CoinId;

/// Co-signing phase of the multi-party proof protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Build a complete proof in one pass (single-owner outputs).
    SinglePass,
    /// Combine the peer's Part2 and produce the aggregation object.
    Step2,
    /// Fold the peer's Part3 responses into the final proof.
    Finalize,
}

/// Coin-identifier recovery payload, bound into the proof challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Part1 {
    pub recovery: [u8; 32],
}

/// Combined nonce commitment `T = Σ (ρᵢ·H + σᵢ·G)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part2 {
    pub t: CompressedRistretto,
}

/// Aggregated responses over the value and blinding components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part3 {
    pub u: Scalar,
    pub tau: Scalar,
}

/// The confidential proof of a committed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfidentialProof {
    pub part1: Part1,
    pub part2: Part2,
    pub part3: Part3,
}

/// The intermediate aggregation object produced by the multisig side in
/// `Step2` and consumed by the contributing side for its Part3. Plain
/// data, exchanged through the parameter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofMultiSig {
    pub total_nonce: CompressedRistretto,
    pub challenge: Scalar,
}

/// Inputs both parties must agree on for the proof to verify: the coin
/// identifier embedded in the recovery payload, the recovery seed and the
/// commitment being proven.
#[derive(Debug, Clone, Copy)]
pub struct CreatorParams {
    pub kidv: CoinId,
    pub seed: [u8; 32],
    pub commitment: CompressedRistretto,
}

impl Default for Part2 {
    fn default() -> Self {
        // The all-zero encoding is the group identity.
        Part2 {
            t: CompressedRistretto([0u8; 32]),
        }
    }
}

impl Default for Part3 {
    fn default() -> Self {
        Part3 {
            u: Scalar::ZERO,
            tau: Scalar::ZERO,
        }
    }
}

impl Default for ProofMultiSig {
    fn default() -> Self {
        ProofMultiSig {
            total_nonce: CompressedRistretto([0u8; 32]),
            challenge: Scalar::ZERO,
        }
    }
}

/// Per-party proof nonces, derived from the persisted proof seed.
fn nonces(seed: &[u8; 32]) -> (Scalar, Scalar) {
    let mut oracle = Oracle::new(b"gloam.proof.nonce");
    oracle.append_bytes(seed);
    let rho = oracle.challenge_scalar();
    let sigma = oracle.challenge_scalar();
    (rho, sigma)
}

/// Proof challenge over the caller-seeded oracle, the commitment and the
/// first two parts.
fn challenge(
    oracle: &mut Oracle,
    commitment: &CompressedRistretto,
    part1: &Part1,
    part2: &Part2,
) -> Scalar {
    oracle
        .append(commitment)
        .append_bytes(&part1.recovery)
        .append(&part2.t);
    oracle.challenge_scalar()
}

fn recovery_keystream(seed: &[u8; 32]) -> [u8; 32] {
    let mut stream = [0u8; 32];
    ChaCha20Rng::from_seed(*seed).fill_bytes(&mut stream);
    stream
}

fn recovery_payload(kidv: &CoinId, seed: &[u8; 32]) -> [u8; 32] {
    let encoded = consensus::serialize(kidv);
    debug_assert!(encoded.len() <= 32);
    let mut payload = [0u8; 32];
    payload[..encoded.len()].copy_from_slice(&encoded);
    let stream = recovery_keystream(seed);
    for (byte, key) in payload.iter_mut().zip(stream.iter()) {
        *byte ^= key;
    }
    payload
}

impl ConfidentialProof {
    /// Advance the multi-party protocol by one phase on the producing
    /// side, or build a complete single-owner proof.
    ///
    /// For `Step2` the peer's Part2 contribution must already be loaded
    /// into `self.part2` and `msig` must be provided; for `Finalize` the
    /// peer's Part3 responses must already be loaded into `self.part3`.
    pub fn co_sign(
        &mut self,
        seed: &[u8; 32],
        blinding: &Scalar,
        creator: &CreatorParams,
        oracle: &mut Oracle,
        phase: Phase,
        msig: Option<&mut ProofMultiSig>,
    ) -> Result<(), Error> {
        let (rho, sigma) = nonces(seed);
        let value = Scalar::from(creator.kidv.value);
        let t_mine = rho * h() + sigma * g();

        match phase {
            Phase::SinglePass => {
                self.part1 = Part1 {
                    recovery: recovery_payload(&creator.kidv, &creator.seed),
                };
                self.part2 = Part2 {
                    t: t_mine.compress(),
                };
                let e = challenge(oracle, &creator.commitment, &self.part1, &self.part2);
                self.part3 = Part3 {
                    u: rho + e * value,
                    tau: sigma + e * blinding,
                };
                Ok(())
            }
            Phase::Step2 => {
                let t_peer = self.part2.t.decompress().ok_or(Error::InvalidPoint)?;
                self.part1 = Part1 {
                    recovery: recovery_payload(&creator.kidv, &creator.seed),
                };
                self.part2 = Part2 {
                    t: (t_peer + t_mine).compress(),
                };
                let e = challenge(oracle, &creator.commitment, &self.part1, &self.part2);
                let msig = msig.ok_or(Error::MissingMultiSig)?;
                *msig = ProofMultiSig {
                    total_nonce: self.part2.t,
                    challenge: e,
                };
                Ok(())
            }
            Phase::Finalize => {
                let e = challenge(oracle, &creator.commitment, &self.part1, &self.part2);
                self.part3.u += rho + e * value;
                self.part3.tau += sigma + e * blinding;
                Ok(())
            }
        }
    }

    /// Verify the proof against the commitment it was produced for. The
    /// oracle must be seeded exactly as at proving time.
    pub fn verify(
        &self,
        commitment: &CompressedRistretto,
        oracle: &mut Oracle,
    ) -> Result<(), Error> {
        let c = commitment.decompress().ok_or(Error::InvalidPoint)?;
        let t = self.part2.t.decompress().ok_or(Error::InvalidPoint)?;
        let e = challenge(oracle, commitment, &self.part1, &self.part2);
        if self.part3.u * h() + self.part3.tau * g() == t + e * c {
            Ok(())
        } else {
            Err(Error::InvalidProof)
        }
    }

    /// Restore the coin identifier embedded in Part1, given the creator
    /// seed. Fails when the payload was not produced under that seed.
    pub fn recover_coin_id(&self, seed: &[u8; 32]) -> Result<CoinId, Error> {
        let stream = recovery_keystream(seed);
        let mut plain = self.part1.recovery;
        for (byte, key) in plain.iter_mut().zip(stream.iter()) {
            *byte ^= key;
        }
        let (kidv, consumed) =
            consensus::deserialize_partial::<CoinId>(&plain).map_err(Error::new)?;
        if plain[consumed..].iter().any(|b| *b != 0) {
            return Err(Error::InvalidProof);
        }
        Ok(kidv)
    }
}

impl ProofMultiSig {
    /// Contributor side of Part2: add this party's nonce commitment into
    /// the (zeroed) Part2 buffer.
    pub fn co_sign_part(seed: &[u8; 32], part2: &mut Part2) -> Result<(), Error> {
        let (rho, sigma) = nonces(seed);
        let current = part2.t.decompress().ok_or(Error::InvalidPoint)?;
        part2.t = (current + rho * h() + sigma * g()).compress();
        Ok(())
    }

    /// Contributor side of Part3: add this party's responses into the
    /// (zeroed) Part3 buffer under the producer's challenge. The
    /// contributor carries no value share, only blinding knowledge.
    pub fn co_sign_part3(
        &self,
        seed: &[u8; 32],
        blinding: &Scalar,
        part3: &mut Part3,
    ) -> Result<(), Error> {
        let (rho, sigma) = nonces(seed);
        part3.u += rho;
        part3.tau += sigma + self.challenge * blinding;
        Ok(())
    }
}

/// Derive the proof seed from the output's blinding factor and value.
pub fn generate_seed(blinding: &Scalar, amount: Amount, oracle: &mut Oracle) -> [u8; 32] {
    oracle.append(blinding).append(&amount);
    oracle.challenge_bytes()
}

/// Derive the recovery seed from the commitment and the master KDF. Both
/// parties of a shared output derive the same value because the
/// commitment is public between them.
pub fn generate_seed_kid(commitment: &CompressedRistretto, kdf: &Kdf) -> [u8; 32] {
    kdf.derive_bytes(b"gloam.seed.kid", commitment.as_bytes())
}

impl Encodable for Part1 {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        self.recovery.consensus_encode(writer)
    }
}

impl Decodable for Part1 {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Part1 {
            recovery: Decodable::consensus_decode(d)?,
        })
    }
}

impl Encodable for Part2 {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        self.t.consensus_encode(writer)
    }
}

impl Decodable for Part2 {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Part2 {
            t: Decodable::consensus_decode(d)?,
        })
    }
}

impl Encodable for Part3 {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let len = self.u.consensus_encode(writer)?;
        Ok(len + self.tau.consensus_encode(writer)?)
    }
}

impl Decodable for Part3 {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Part3 {
            u: Decodable::consensus_decode(d)?,
            tau: Decodable::consensus_decode(d)?,
        })
    }
}

impl Encodable for ConfidentialProof {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let mut len = self.part1.consensus_encode(writer)?;
        len += self.part2.consensus_encode(writer)?;
        Ok(len + self.part3.consensus_encode(writer)?)
    }
}

impl Decodable for ConfidentialProof {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(ConfidentialProof {
            part1: Decodable::consensus_decode(d)?,
            part2: Decodable::consensus_decode(d)?,
            part3: Decodable::consensus_decode(d)?,
        })
    }
}

impl_strict_encoding!(ConfidentialProof);

impl Encodable for ProofMultiSig {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let len = self.total_nonce.consensus_encode(writer)?;
        Ok(len + self.challenge.consensus_encode(writer)?)
    }
}

impl Decodable for ProofMultiSig {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(ProofMultiSig {
            total_nonce: Decodable::consensus_decode(d)?,
            challenge: Decodable::consensus_decode(d)?,
        })
    }
}

impl_strict_encoding!(ProofMultiSig);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::SHARED_OUTPUT_MATURITY;
    use crate::crypto::commit;
    use crate::wallet::CoinKind;

    fn proof_oracle() -> Oracle {
        let mut oracle = Oracle::default();
        oracle.append(&SHARED_OUTPUT_MATURITY);
        oracle
    }

    fn creator(value: Amount, commitment: CompressedRistretto) -> CreatorParams {
        CreatorParams {
            kidv: CoinId {
                idx: 9,
                sub_idx: 2,
                value,
                kind: CoinKind::Shared,
            },
            seed: [0x5au8; 32],
            commitment,
        }
    }

    #[test]
    fn single_pass_proof_verifies() {
        let blinding = Scalar::from(777u64);
        let commitment = commit(100, &blinding).compress();
        let params = creator(100, commitment);

        let mut proof = ConfidentialProof::default();
        proof
            .co_sign(
                &[1u8; 32],
                &blinding,
                &params,
                &mut proof_oracle(),
                Phase::SinglePass,
                None,
            )
            .unwrap();
        proof.verify(&commitment, &mut proof_oracle()).unwrap();

        // Any mutated part must fail verification.
        let mut bad = proof;
        bad.part3.tau += Scalar::ONE;
        assert!(bad.verify(&commitment, &mut proof_oracle()).is_err());
        let mut bad = proof;
        bad.part1.recovery[0] ^= 1;
        assert!(bad.verify(&commitment, &mut proof_oracle()).is_err());
    }

    #[test]
    fn three_phase_shared_proof_verifies() {
        let mine = Scalar::from(31337u64);
        let theirs = Scalar::from(1729u64);
        let commitment = commit(250, &(mine + theirs)).compress();
        let params = creator(250, commitment);
        let seed_a = [0xa1u8; 32];
        let seed_b = [0xb2u8; 32];

        // Contributor emits its Part2.
        let mut peer_part2 = Part2::default();
        ProofMultiSig::co_sign_part(&seed_b, &mut peer_part2).unwrap();

        // Producer combines and emits the aggregation object.
        let mut proof = ConfidentialProof::default();
        proof.part2 = peer_part2;
        let mut msig = ProofMultiSig::default();
        proof
            .co_sign(
                &seed_a,
                &mine,
                &params,
                &mut proof_oracle(),
                Phase::Step2,
                Some(&mut msig),
            )
            .unwrap();

        // Contributor answers with its Part3.
        let mut peer_part3 = Part3::default();
        msig.co_sign_part3(&seed_b, &theirs, &mut peer_part3).unwrap();

        // Producer finalizes.
        proof.part3 = peer_part3;
        proof
            .co_sign(
                &seed_a,
                &mine,
                &params,
                &mut proof_oracle(),
                Phase::Finalize,
                None,
            )
            .unwrap();

        proof.verify(&commitment, &mut proof_oracle()).unwrap();

        // A tampered contributor response survives finalization but not
        // verification.
        let mut tampered = Part3::default();
        msig.co_sign_part3(&seed_b, &(theirs + Scalar::ONE), &mut tampered)
            .unwrap();
        let mut bad = ConfidentialProof {
            part1: proof.part1,
            part2: proof.part2,
            part3: tampered,
        };
        bad.co_sign(
            &seed_a,
            &mine,
            &params,
            &mut proof_oracle(),
            Phase::Finalize,
            None,
        )
        .unwrap();
        assert!(bad.verify(&commitment, &mut proof_oracle()).is_err());
    }

    #[test]
    fn proof_is_deterministic_per_seed() {
        let blinding = Scalar::from(4242u64);
        let commitment = commit(9, &blinding).compress();
        let params = creator(9, commitment);

        let mut first = ConfidentialProof::default();
        let mut second = ConfidentialProof::default();
        for proof in [&mut first, &mut second] {
            proof
                .co_sign(
                    &[7u8; 32],
                    &blinding,
                    &params,
                    &mut proof_oracle(),
                    Phase::SinglePass,
                    None,
                )
                .unwrap();
        }
        assert_eq!(first, second);
    }

    #[test]
    fn coin_id_recovery_roundtrip() {
        let blinding = Scalar::from(55u64);
        let commitment = commit(64, &blinding).compress();
        let params = creator(64, commitment);

        let mut proof = ConfidentialProof::default();
        proof
            .co_sign(
                &[3u8; 32],
                &blinding,
                &params,
                &mut proof_oracle(),
                Phase::SinglePass,
                None,
            )
            .unwrap();

        assert_eq!(proof.recover_coin_id(&params.seed).unwrap(), params.kidv);
        assert!(proof.recover_coin_id(&[0u8; 32]).is_err());
    }
}
