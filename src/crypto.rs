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

//! Cryptographic primitives backing the swap core: the Ristretto group
//! with the Pedersen generator pair, the transcript oracle, deterministic
//! nonce derivation and the Schnorr kernel multisignature.
//!
//! All randomness in the signing path is derived from persisted secrets
//! through the oracle, so a wallet restarted from its parameter store
//! reproduces bit-identical signatures and proofs.

use std::error;
use std::io;

use bulletproofs::PedersenGens;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::blockchain::Amount;
use crate::consensus::{self, Decodable, Encodable};

pub mod kdf;
pub mod rangeproof;

/// List of cryptographic errors that can be encountered when processing
/// signatures, proofs, key derivation, or commitments.
#[derive(Error, Debug)]
pub enum Error {
    /// The signature does not pass the validation tests.
    #[error("The signature does not pass the validation")]
    InvalidSignature,
    /// The proof does not pass the validation tests.
    #[error("The proof does not pass the validation")]
    InvalidProof,
    /// The point encoding does not decompress onto the curve.
    #[error("The point encoding is not a valid curve point")]
    InvalidPoint,
    /// The scalar encoding is not canonical.
    #[error("The scalar encoding is not canonical")]
    InvalidScalar,
    /// The aggregation output is required for this co-signing phase.
    #[error("The multi-signature aggregation output is required for this phase")]
    MissingMultiSig,
    /// Any cryptographic error not part of this list.
    #[error("Cryptographic error: {0}")]
    Other(Box<dyn error::Error + Send + Sync>),
}

impl Error {
    /// Creates a new cryptographic error of type other with an arbitrary
    /// payload.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::Other(error.into())
    }

    /// Consumes the `Error`, returning its inner error (if any).
    pub fn into_inner(self) -> Option<Box<dyn error::Error + Send + Sync>> {
        match self {
            Self::Other(error) => Some(error),
            _ => None,
        }
    }
}

static GENS: Lazy<PedersenGens> = Lazy::new(PedersenGens::default);

/// The Pedersen generator pair used by the whole chain.
pub fn generators() -> &'static PedersenGens {
    &GENS
}

/// The blinding generator `G`. Public keys and excesses are multiples of
/// this point.
pub fn g() -> RistrettoPoint {
    GENS.B_blinding
}

/// The value generator `H`, nothing-up-my-sleeve companion of [`g`].
pub fn h() -> RistrettoPoint {
    GENS.B
}

/// Pedersen commitment `value·H + blinding·G`.
pub fn commit(value: Amount, blinding: &Scalar) -> RistrettoPoint {
    Scalar::from(value) * h() + blinding * g()
}

/// Transcript oracle with deterministic challenge derivation. Values are
/// consensus-encoded before being absorbed so both parties agree on the
/// transcript byte for byte.
pub struct Oracle(Transcript);

impl Oracle {
    pub fn new(domain: &'static [u8]) -> Self {
        Oracle(Transcript::new(domain))
    }

    /// Absorb a consensus-encodable value, chainable.
    pub fn append<T: Encodable + std::fmt::Debug>(&mut self, value: &T) -> &mut Self {
        self.0.append_message(b"item", &consensus::serialize(value));
        self
    }

    /// Absorb raw bytes, chainable.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.append_message(b"item", bytes);
        self
    }

    /// Derive a scalar challenge, advancing the transcript.
    pub fn challenge_scalar(&mut self) -> Scalar {
        let mut buf = [0u8; 64];
        self.0.challenge_bytes(b"challenge", &mut buf);
        Scalar::from_bytes_mod_order_wide(&buf)
    }

    /// Derive a 32-byte challenge, advancing the transcript.
    pub fn challenge_bytes(&mut self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        self.0.challenge_bytes(b"challenge", &mut buf);
        buf
    }
}

impl Default for Oracle {
    fn default() -> Self {
        Oracle::new(b"gloam.oracle")
    }
}

/// Derive the secret signing nonce for a kernel signature from the
/// signer's blinding excess and the message. Never transmitted; the
/// counterparty only sees `nonce·G`.
pub fn derive_nonce(secret: &Scalar, message: &[u8; 32]) -> Scalar {
    let mut oracle = Oracle::new(b"gloam.kernel.nonce");
    oracle.append(secret).append(message);
    oracle.challenge_scalar()
}

/// Fiat-Shamir challenge binding the total nonce, the total excess and
/// the kernel message. Both parties compute it over the same compressed
/// encodings.
pub fn signature_challenge(
    total_nonce: &CompressedRistretto,
    total_excess: &CompressedRistretto,
    message: &[u8; 32],
) -> Scalar {
    let mut oracle = Oracle::new(b"gloam.kernel.sig");
    oracle
        .append(total_nonce)
        .append(total_excess)
        .append(message);
    oracle.challenge_scalar()
}

/// One party's share of the aggregate kernel signature.
pub fn partial_signature(secret_excess: &Scalar, nonce: &Scalar, challenge: &Scalar) -> Scalar {
    nonce + challenge * secret_excess
}

/// Check a counterparty's partial signature against its public nonce and
/// public excess.
pub fn verify_partial(
    public_excess: &RistrettoPoint,
    public_nonce: &RistrettoPoint,
    challenge: &Scalar,
    partial: &Scalar,
) -> bool {
    partial * g() == public_nonce + challenge * public_excess
}

/// An aggregate Schnorr signature over the blinding generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Total public nonce `R = Σ rᵢ·G`.
    pub nonce: CompressedRistretto,
    /// Aggregate response `s = Σ (rᵢ + e·kᵢ)`.
    pub value: Scalar,
}

impl Signature {
    /// Verify against the total public excess and the signed message.
    pub fn verify(&self, public: &RistrettoPoint, message: &[u8; 32]) -> Result<(), Error> {
        let nonce = self.nonce.decompress().ok_or(Error::InvalidPoint)?;
        let challenge = signature_challenge(&self.nonce, &public.compress(), message);
        if self.value * g() == nonce + challenge * public {
            Ok(())
        } else {
            Err(Error::InvalidSignature)
        }
    }
}

impl Encodable for Signature {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let len = self.nonce.consensus_encode(writer)?;
        Ok(len + self.value.consensus_encode(writer)?)
    }
}

impl Decodable for Signature {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Signature {
            nonce: Decodable::consensus_decode(d)?,
            value: Decodable::consensus_decode(d)?,
        })
    }
}

impl_strict_encoding!(Signature);

impl Encodable for Scalar {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        self.to_bytes().consensus_encode(writer)
    }
}

impl Decodable for Scalar {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        let buf: [u8; 32] = Decodable::consensus_decode(d)?;
        Option::<Scalar>::from(Scalar::from_canonical_bytes(buf))
            .ok_or(consensus::Error::ParseFailed("non-canonical scalar"))
    }
}

// Point validity is checked at decompression, not at decode: a stored or
// received encoding stays opaque until the protocol actually uses it.
impl Encodable for CompressedRistretto {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        self.to_bytes().consensus_encode(writer)
    }
}

impl Decodable for CompressedRistretto {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        let buf: [u8; 32] = Decodable::consensus_decode(d)?;
        Ok(CompressedRistretto(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pedersen_commitment_is_homomorphic() {
        let a = Scalar::from(11u64);
        let b = Scalar::from(31u64);
        assert_eq!(commit(5, &a) + commit(7, &b), commit(12, &(a + b)));
    }

    #[test]
    fn oracle_is_deterministic() {
        let mut left = Oracle::new(b"test");
        let mut right = Oracle::new(b"test");
        left.append(&42u64).append_bytes(b"payload");
        right.append(&42u64).append_bytes(b"payload");
        assert_eq!(left.challenge_scalar(), right.challenge_scalar());

        let mut other = Oracle::new(b"test");
        other.append(&43u64).append_bytes(b"payload");
        assert_ne!(
            Oracle::new(b"test").append(&42u64).challenge_scalar(),
            other.challenge_scalar()
        );
    }

    #[test]
    fn two_party_aggregate_signature() {
        let message = [7u8; 32];
        let k_a = Scalar::from(1234u64);
        let k_b = Scalar::from(5678u64);
        let r_a = derive_nonce(&k_a, &message);
        let r_b = derive_nonce(&k_b, &message);

        let total_nonce = ((r_a + r_b) * g()).compress();
        let total_excess = ((k_a + k_b) * g()).compress();
        let e = signature_challenge(&total_nonce, &total_excess, &message);

        let s_a = partial_signature(&k_a, &r_a, &e);
        let s_b = partial_signature(&k_b, &r_b, &e);
        assert!(verify_partial(&(k_b * g()), &(r_b * g()), &e, &s_b));
        assert!(!verify_partial(&(k_b * g()), &(r_b * g()), &e, &s_a));

        let sig = Signature {
            nonce: total_nonce,
            value: s_a + s_b,
        };
        sig.verify(&total_excess.decompress().unwrap(), &message)
            .unwrap();
        assert!(sig.verify(&(k_a * g()), &message).is_err());
    }

    #[test]
    fn scalar_decoding_rejects_non_canonical() {
        // The group order minus one round-trips, all-ones does not.
        let fine = -Scalar::ONE;
        let bytes = consensus::serialize(&fine);
        assert_eq!(consensus::deserialize::<Scalar>(&bytes).unwrap(), fine);
        assert!(consensus::deserialize::<Scalar>(&[0xff; 32]).is_err());
    }
}
