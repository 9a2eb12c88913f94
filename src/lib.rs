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

//! Gloam swap core implements the cryptographic coordination of a two-party
//! atomic swap between the Gloam confidential chain and a counter-chain:
//!
//! - The lock transaction state machine, advancing a shared confidential
//!   output through rounds of peer exchange
//! - The lock transaction builder: shared blinding factor and seed
//!   derivation, the three-phase co-signed confidential proof, partial
//!   kernel signatures and final transaction assembly
//! - The narrow parameter-store, wallet and gateway contracts the core
//!   requires from its host
//!
//! ## Core framework
//! The state machine is deterministic and resumable: every intermediate
//! value is persisted through the [`params::ParameterStore`] before the
//! corresponding peer bundle is emitted, so a restarted wallet re-derives
//! bit-identical messages from the store alone. Builders are transient
//! working views rebuilt on every [`swap::AtomicSwapTransaction::update`].
//!
//! The host supplies transport and persistence by implementing
//! [`gateway::Gateway`], [`params::ParameterStore`] and
//! [`wallet::WalletDb`]; reference in-memory backends are provided.

// Coding conventions
#![forbid(unsafe_code)]
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(unused_mut)]

#[macro_use]
extern crate amplify;

#[macro_use]
extern crate serde;

use thiserror::Error;

#[macro_use]
pub mod consensus;

pub mod blockchain;
pub mod builder;
pub mod crypto;
pub mod gateway;
pub mod lock;
pub mod messages;
pub mod params;
pub mod swap;
pub mod transaction;
pub mod wallet;

/// A list of possible errors when coordinating an atomic swap with the
/// Gloam software stack. Each error can have multiple levels down to the
/// primitive implementation.
#[derive(Error, Debug)]
pub enum Error {
    /// A consensus error during encoding/decoding operation or data type
    /// mismatch.
    #[error("Consensus error: {0}")]
    Consensus(#[from] consensus::Error),
    /// A cryptographic error during key derivation, signatures, proofs, or
    /// commitment generation and validation.
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] crypto::Error),
    /// A parameter store error.
    #[error("Parameter error: {0}")]
    Params(#[from] params::Error),
    /// A wallet database error.
    #[error("Wallet error: {0}")]
    Wallet(#[from] wallet::Error),
    /// A transaction assembly or validation error.
    #[error("Transaction error: {0}")]
    Transaction(#[from] transaction::Error),
    /// A swap state machine error.
    #[error("Swap error: {0}")]
    Swap(#[from] swap::Error),
}

/// Result of a high level computation such as the swap state machine
/// advancing one round, wraps the crate level [`enum@Error`] type.
pub type Res<T> = Result<T, Error>;
