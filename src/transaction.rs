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

//! The confidential transaction data model of the native chain: committed
//! inputs and proof-carrying outputs balanced by a signed kernel.
//!
//! The balance rule verified here is
//! `Σ outputs − Σ inputs + fee·H + offset·G == kernel excess`, so a
//! transaction reveals nothing about individual values while still
//! proving that no value was created. The offset decouples the kernel
//! from the blinding sums of the participants; for a swap lock
//! transaction both parties fold the negated shared blinding factor into
//! it, which is exactly what makes the two halves cancel.

use std::io;

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use thiserror::Error;

use crate::blockchain::{Amount, ChainContext, Height};
use crate::consensus::{self, Decodable, Encodable};
use crate::crypto::{self, rangeproof::ConfidentialProof, Oracle, Signature};

/// A list specifying general categories of transaction error.
#[derive(Error, Debug)]
pub enum Error {
    /// The kernel signature is absent or does not verify.
    #[error("The kernel signature does not pass the validation")]
    InvalidKernelSignature,
    /// An output proof is absent or does not verify.
    #[error("An output confidential proof does not pass the validation")]
    InvalidOutputProof,
    /// The commitment sums do not balance against the kernel excess.
    #[error("The transaction does not balance")]
    InvalidBalance,
    /// The kernel height window does not contain the context height.
    #[error("The kernel height window excludes the current height")]
    HeightWindow,
    /// A stored point encoding does not decompress onto the curve.
    #[error("A point encoding is not a valid curve point")]
    InvalidPoint,
}

fixed_hash::construct_fixed_hash!(
    /// Identifier of a kernel, the hash of its immutable fields. Stable
    /// across signature aggregation, so both parties derive it before the
    /// final signature exists.
    #[derive(Serialize, Deserialize)]
    pub struct KernelId(32);
);

impl Encodable for KernelId {
    fn consensus_encode<W: io::Write>(&self, s: &mut W) -> Result<usize, io::Error> {
        self.0.consensus_encode(s)
    }
}

impl Decodable for KernelId {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        let bytes: [u8; 32] = Decodable::consensus_decode(d)?;
        Ok(Self::from_slice(&bytes))
    }
}

impl_strict_encoding!(KernelId);

/// A spent output, referenced by its commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    pub commitment: CompressedRistretto,
}

impl Encodable for Input {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        self.commitment.consensus_encode(writer)
    }
}

impl Decodable for Input {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Input {
            commitment: Decodable::consensus_decode(d)?,
        })
    }
}

/// A created output: a Pedersen commitment with its confidential proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    pub commitment: CompressedRistretto,
    pub proof: ConfidentialProof,
}

impl Output {
    /// Verify the attached proof against the commitment, under the
    /// maturity the output was proven at.
    pub fn verify_proof(&self, maturity: Height) -> Result<(), crypto::Error> {
        let mut oracle = Oracle::default();
        oracle.append(&maturity);
        self.proof.verify(&self.commitment, &mut oracle)
    }
}

impl Encodable for Output {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let len = self.commitment.consensus_encode(writer)?;
        Ok(len + self.proof.consensus_encode(writer)?)
    }
}

impl Decodable for Output {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Output {
            commitment: Decodable::consensus_decode(d)?,
            proof: Decodable::consensus_decode(d)?,
        })
    }
}

/// The signed descriptor of a transaction: fee, validity window, excess
/// point and the aggregate signature over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    pub fee: Amount,
    pub min_height: Height,
    pub max_height: Height,
    pub excess: CompressedRistretto,
    pub signature: Option<Signature>,
}

impl Kernel {
    pub fn new(fee: Amount, min_height: Height, max_height: Height) -> Self {
        Kernel {
            fee,
            min_height,
            max_height,
            excess: RistrettoPoint::identity().compress(),
            signature: None,
        }
    }

    /// The message both parties sign: a challenge over the immutable
    /// kernel fields.
    pub fn message(&self) -> [u8; 32] {
        let mut oracle = Oracle::new(b"gloam.kernel");
        oracle
            .append(&self.fee)
            .append(&self.min_height)
            .append(&self.max_height);
        oracle.challenge_bytes()
    }

    /// Kernel identifier over the immutable fields and the excess.
    pub fn id(&self) -> KernelId {
        let mut oracle = Oracle::new(b"gloam.kernel.id");
        oracle
            .append(&self.fee)
            .append(&self.min_height)
            .append(&self.max_height)
            .append(&self.excess);
        KernelId::from_slice(&oracle.challenge_bytes())
    }

    /// Verify the aggregate signature under the kernel excess.
    pub fn verify(&self) -> Result<(), Error> {
        let excess = self
            .excess
            .decompress()
            .ok_or(Error::InvalidPoint)?;
        let signature = self
            .signature
            .as_ref()
            .ok_or(Error::InvalidKernelSignature)?;
        signature
            .verify(&excess, &self.message())
            .map_err(|_| Error::InvalidKernelSignature)
    }
}

impl Encodable for Kernel {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let mut len = self.fee.consensus_encode(writer)?;
        len += self.min_height.consensus_encode(writer)?;
        len += self.max_height.consensus_encode(writer)?;
        len += self.excess.consensus_encode(writer)?;
        Ok(len + self.signature.consensus_encode(writer)?)
    }
}

impl Decodable for Kernel {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Kernel {
            fee: Decodable::consensus_decode(d)?,
            min_height: Decodable::consensus_decode(d)?,
            max_height: Decodable::consensus_decode(d)?,
            excess: Decodable::consensus_decode(d)?,
            signature: Decodable::consensus_decode(d)?,
        })
    }
}

impl_strict_encoding!(Kernel);

/// A complete confidential transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub kernel: Kernel,
    /// Total offset scalar, the sum of both parties' contributions.
    pub offset: Scalar,
}

impl Transaction {
    /// Validate against chain rules: height window, kernel signature,
    /// output proofs and the balance equation.
    pub fn is_valid(&self, ctx: &ChainContext) -> Result<(), Error> {
        if ctx.height < self.kernel.min_height || ctx.height > self.kernel.max_height {
            return Err(Error::HeightWindow);
        }

        self.kernel.verify()?;

        for output in &self.outputs {
            output
                .verify_proof(crate::blockchain::SHARED_OUTPUT_MATURITY)
                .map_err(|_| Error::InvalidOutputProof)?;
        }

        let mut sum = RistrettoPoint::identity();
        for output in &self.outputs {
            sum += output.commitment.decompress().ok_or(Error::InvalidPoint)?;
        }
        for input in &self.inputs {
            sum -= input.commitment.decompress().ok_or(Error::InvalidPoint)?;
        }
        sum += Scalar::from(self.kernel.fee) * crypto::h();
        sum += self.offset * crypto::g();

        let excess = self
            .kernel
            .excess
            .decompress()
            .ok_or(Error::InvalidPoint)?;
        if sum != excess {
            return Err(Error::InvalidBalance);
        }
        Ok(())
    }

    /// Consensus-encoded size of the transaction body, checked against
    /// the chain's size limit at finalization.
    pub fn body_size(&self) -> usize {
        consensus::serialize(&self.inputs).len() + consensus::serialize(&self.outputs).len()
    }
}

impl Encodable for Transaction {
    fn consensus_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let mut len = self.inputs.consensus_encode(writer)?;
        len += self.outputs.consensus_encode(writer)?;
        len += self.kernel.consensus_encode(writer)?;
        Ok(len + self.offset.consensus_encode(writer)?)
    }
}

impl Decodable for Transaction {
    fn consensus_decode<D: io::Read>(d: &mut D) -> Result<Self, consensus::Error> {
        Ok(Transaction {
            inputs: Decodable::consensus_decode(d)?,
            outputs: Decodable::consensus_decode(d)?,
            kernel: Decodable::consensus_decode(d)?,
            offset: Decodable::consensus_decode(d)?,
        })
    }
}

impl_strict_encoding!(Transaction);
