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

//! Hierarchical key derivation and the switch-commitment scheme that turns
//! a coin identifier into its blinding factor.
//!
//! The master KDF is read-only after wallet open; child KDFs are derived
//! per subkey index. Derivations are pure functions of the secret and the
//! inputs, so a restarted wallet always re-derives the same blindings.

use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha256};

use crate::consensus;
use crate::crypto::Oracle;
use crate::wallet::CoinId;

/// A key derivation function: one secret from which scalars and byte
/// seeds are deterministically derived.
#[derive(Clone)]
pub struct Kdf {
    secret: [u8; 32],
}

impl Kdf {
    /// Build a KDF from arbitrary seed entropy.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"gloam.kdf");
        hasher.update(seed);
        Kdf {
            secret: hasher.finalize().into(),
        }
    }

    /// Derive the child KDF for a subkey index.
    pub fn derive_child(&self, sub_idx: u32) -> Kdf {
        let mut hasher = Sha256::new();
        hasher.update(b"gloam.kdf.child");
        hasher.update(self.secret);
        hasher.update(sub_idx.to_le_bytes());
        Kdf {
            secret: hasher.finalize().into(),
        }
    }

    /// Derive a scalar bound to this KDF, a domain label and input data.
    pub fn derive_scalar(&self, label: &'static [u8], data: &[u8]) -> Scalar {
        let mut oracle = Oracle::new(label);
        oracle.append_bytes(&self.secret).append_bytes(data);
        oracle.challenge_scalar()
    }

    /// Derive 32 bytes bound to this KDF, a domain label and input data.
    pub fn derive_bytes(&self, label: &'static [u8], data: &[u8]) -> [u8; 32] {
        let mut oracle = Oracle::new(label);
        oracle.append_bytes(&self.secret).append_bytes(data);
        oracle.challenge_bytes()
    }
}

impl std::fmt::Debug for Kdf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets stay out of logs.
        f.write_str("Kdf(..)")
    }
}

/// Switch-commitment derivation: the blinding factor of a coin from its
/// child KDF and the coin identifier.
pub fn switch_blinding(child: &Kdf, coin_id: &CoinId) -> Scalar {
    child.derive_scalar(b"gloam.switch", &consensus::serialize(coin_id))
}
